use std::{net::SocketAddr, process, sync::Arc};

use pressroom::{
    application::{
        clock::{Clock, SystemClock},
        error::AppError,
        print::{PrintService, PrintSettings},
        render::Renderer,
        store::{ArtifactStore, StorageReclaimer},
    },
    config,
    infra::{
        error::InfraError,
        http::{self, PrintState},
        renderer::CommandRenderer,
        storage::TempStorage,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Purge(_) => run_purge(settings),
    }
}

fn open_storage(settings: &config::Settings) -> Result<Arc<TempStorage>, AppError> {
    let storage = TempStorage::new(settings.storage.directory.clone()).map_err(|source| {
        InfraError::StorageRoot {
            path: settings.storage.directory.clone(),
            source,
        }
    })?;
    Ok(Arc::new(storage))
}

fn run_purge(settings: config::Settings) -> Result<(), AppError> {
    let storage = open_storage(&settings)?;
    let purged = storage
        .purge_leftovers()
        .map_err(InfraError::from)?;
    info!(
        target = "pressroom::purge",
        purged,
        root = %storage.root().display(),
        "Purge completed"
    );
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let storage = open_storage(&settings)?;
    storage
        .purge_leftovers()
        .map_err(InfraError::from)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let reclaimer: Arc<dyn StorageReclaimer> = storage.clone();
    let store = Arc::new(ArtifactStore::new(
        settings.storage.retention,
        clock.clone(),
        reclaimer,
    ));
    let renderer: Arc<dyn Renderer> = Arc::new(CommandRenderer::from(&settings.render));
    let print = Arc::new(PrintService::new(
        renderer,
        store.clone(),
        storage.clone(),
        clock,
        PrintSettings::from(&settings),
    ));

    let result = serve_http(&settings, PrintState::new(print, &settings)).await;

    let drained = tokio::task::spawn_blocking(move || store.drain_all())
        .await
        .map_err(|err| AppError::unexpected(format!("store drain failed: {err}")))?;
    info!(
        target = "pressroom::serve",
        drained,
        "Released remaining artifacts"
    );

    result
}

async fn serve_http(settings: &config::Settings, state: PrintState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|source| InfraError::Bind {
            addr: settings.server.addr,
            source,
        })?;
    info!(
        target = "pressroom::serve",
        addr = %settings.server.addr,
        storage = %settings.storage.directory.display(),
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| InfraError::Server(err).into());
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(target = "pressroom::serve", error = %err, "Failed to listen for shutdown signal");
            }
        }
    }

    info!(target = "pressroom::serve", "Shutting down");
    let _ = shutdown_tx.send(());
    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => result.map_err(|err| InfraError::Server(err).into()),
        Err(_) => {
            warn!(
                target = "pressroom::serve",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "Graceful shutdown timed out"
            );
            Ok(())
        }
    }
}
