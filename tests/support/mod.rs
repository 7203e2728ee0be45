//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use pressroom::{
    application::{
        clock::ManualClock,
        print::{PrintService, PrintSettings},
        render::{ForwardedHeaders, RenderError, Renderer},
        store::ArtifactStore,
    },
    domain::{artifact::OutputFormat, spec::PrintSpec},
    infra::{
        http::{PrintState, build_router},
        storage::TempStorage,
    },
};
use serde_json::{Value, json};
use tempfile::TempDir;
use time::{OffsetDateTime, macros::datetime};
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const START: OffsetDateTime = datetime!(2026-10-17 15:04:05 UTC);
pub const RETENTION: Duration = Duration::from_secs(600);

/// Writes a deterministic document derived from the spec and headers.
///
/// A spec with `"fail": true` writes a partial document and then fails.
pub struct EchoRenderer;

#[async_trait]
impl Renderer for EchoRenderer {
    fn output_format(&self, spec: &PrintSpec) -> Result<OutputFormat, RenderError> {
        match spec.output_format().unwrap_or("pdf") {
            "pdf" => Ok(OutputFormat::new("pdf", "application/pdf")),
            "png" => Ok(OutputFormat::new("png", "image/png")),
            other => Err(RenderError::Unsupported {
                format: other.to_string(),
            }),
        }
    }

    async fn render(
        &self,
        spec: &PrintSpec,
        headers: &ForwardedHeaders,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), RenderError> {
        let document = Value::Object(spec.document().clone());
        sink.write_all(format!("%DOC {document}").as_bytes()).await?;
        for (name, value) in headers.iter() {
            sink.write_all(format!("\n{name}: {value}").as_bytes())
                .await?;
        }
        if spec.document().get("fail") == Some(&Value::Bool(true)) {
            return Err(RenderError::render("requested failure"));
        }
        Ok(())
    }

    fn capabilities(&self, app: Option<&str>) -> Value {
        json!({
            "layouts": [{ "name": "A4 portrait" }],
            "outputFormats": [{ "name": "pdf" }, { "name": "png" }],
            "scales": if app == Some("city") { json!([1000, 5000]) } else { json!([25000]) },
        })
    }

    fn output_file_name(&self, _app: Option<&str>, layout: Option<&str>) -> String {
        layout.unwrap_or("map-print").to_string()
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<TempStorage>,
    pub store: Arc<ArtifactStore>,
    pub print: Arc<PrintService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(PrintSettings::default())
    }

    pub fn with_settings(settings: PrintSettings) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let storage =
            Arc::new(TempStorage::new(dir.path().join("artifacts")).expect("storage"));
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(ArtifactStore::new(
            RETENTION,
            clock.clone(),
            storage.clone(),
        ));
        let print = Arc::new(PrintService::new(
            Arc::new(EchoRenderer),
            store.clone(),
            storage.clone(),
            clock.clone(),
            settings,
        ));
        Self {
            dir,
            clock,
            storage,
            store,
            print,
        }
    }

    pub fn router(&self, base_url: Option<&str>) -> axum::Router {
        build_router(PrintState {
            print: self.print.clone(),
            base_url: base_url.map(str::to_string),
            body_limit: 1024 * 1024,
        })
    }

    /// Number of files currently in the storage directory.
    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(self.storage.root())
            .expect("read storage dir")
            .count()
    }
}
