//! Print job orchestration.
//!
//! A job parses the submitted spec, asks the renderer for its output format,
//! renders into a fresh artifact file and then either streams the bytes back
//! (synchronous mode) or publishes the file in the store under a handle
//! (ticket mode). Any failure before publication deletes the partial file.
//!
//! Deliveries carry an open file handle rather than the document bytes; the
//! transport streams it. File creation and sweeps run on the blocking pool.

use std::{io, net::SocketAddr, sync::Arc, time::Instant};

use axum::http::HeaderMap;
use bytes::Bytes;
use metrics::{counter, histogram};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
    task,
};
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    domain::{
        artifact::{ArtifactDraft, NamingHints, OutputFormat},
        error::DomainError,
        filename::format_file_name,
        spec::{InputEncoding, PrintSpec},
    },
    infra::storage::{PendingArtifact, TempStorage, TempStorageError},
};

use super::{
    clock::Clock,
    render::{ForwardedHeaders, RenderError, Renderer},
    store::ArtifactStore,
};

pub const METRIC_RENDER_FAILURES: &str = "pressroom_render_failures_total";
pub const METRIC_RENDER_MS: &str = "pressroom_render_ms";

const FORWARDED_FOR: &str = "X-Forwarded-For";

#[derive(Debug, Error)]
pub enum PrintError {
    #[error("Missing 'spec' parameter")]
    MissingSpec,
    #[error("File with id={handle} unknown")]
    UnknownHandle { handle: String },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("artifact storage failed")]
    Storage(#[from] TempStorageError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Knobs of the orchestrator that come from configuration.
#[derive(Debug, Clone)]
pub struct PrintSettings {
    /// Request headers passed on to the renderer, matched case-insensitively.
    pub forward_headers: Vec<String>,
    pub add_forwarded_for: bool,
    pub encoding: InputEncoding,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            forward_headers: vec!["Referer".to_string(), "Cookie".to_string()],
            add_forwarded_for: false,
            encoding: InputEncoding::Utf8,
        }
    }
}

impl From<&Settings> for PrintSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            forward_headers: settings.render.forward_headers.clone(),
            add_forwarded_for: settings.render.add_forwarded_for,
            encoding: settings.request.encoding,
        }
    }
}

/// Raw spec as it arrived with the request.
#[derive(Debug, Clone)]
pub enum SpecPayload {
    /// Already-decoded text, e.g. from the `spec` query parameter.
    Text(String),
    /// Request body, decoded with the configured input encoding.
    Body(Bytes),
}

#[derive(Debug, Clone, Default)]
pub struct PrintRequest {
    pub spec: Option<SpecPayload>,
    pub headers: HeaderMap,
    pub peer: Option<SocketAddr>,
}

/// Document ready to be streamed to the caller.
#[derive(Debug)]
pub struct Delivery {
    /// Positioned at the start of the document. In synchronous mode the file
    /// is already unlinked and vanishes once this handle is dropped.
    pub content: File,
    pub content_length: u64,
    pub content_type: String,
    pub file_name: String,
}

impl Delivery {
    /// Read the whole document into memory.
    pub async fn into_bytes(mut self) -> io::Result<Bytes> {
        let capacity = usize::try_from(self.content_length).unwrap_or_default();
        let mut buffer = Vec::with_capacity(capacity);
        self.content.read_to_end(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub handle: String,
}

pub struct PrintService {
    renderer: Arc<dyn Renderer>,
    store: Arc<ArtifactStore>,
    storage: Arc<TempStorage>,
    clock: Arc<dyn Clock>,
    settings: PrintSettings,
}

impl PrintService {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        store: Arc<ArtifactStore>,
        storage: Arc<TempStorage>,
        clock: Arc<dyn Clock>,
        settings: PrintSettings,
    ) -> Self {
        Self {
            renderer,
            store,
            storage,
            clock,
            settings,
        }
    }

    /// Render and hand the bytes back right away. Nothing is kept.
    pub async fn render_synchronous(&self, request: PrintRequest) -> Result<Delivery, PrintError> {
        let (spec, format, pending) = self.render_job(request).await?;

        // the open handle keeps the unlinked file readable
        let opened = pending.reader().await;
        pending.discard();
        let (content, content_length) = opened.map_err(TempStorageError::from)?;

        let file_name = self.file_name(&spec.naming_hints(), &format.file_suffix);
        Ok(Delivery {
            content,
            content_length,
            content_type: format.content_type,
            file_name,
        })
    }

    /// Render and publish the artifact under a handle for later retrieval.
    pub async fn render_async(&self, request: PrintRequest) -> Result<Ticket, PrintError> {
        let store = self.store.clone();
        if let Err(err) = task::spawn_blocking(move || store.evict_expired()).await {
            warn!(target = "pressroom::print", error = %err, "Eviction sweep aborted");
        }

        let (spec, format, pending) = self.render_job(request).await?;
        let handle = pending.handle().to_string();
        let storage = task::spawn_blocking(move || pending.persist())
            .await
            .map_err(|err| TempStorageError::from(io::Error::other(err)))??;

        self.store.register(ArtifactDraft {
            handle: handle.clone(),
            storage,
            format,
            naming: spec.naming_hints(),
        });

        info!(
            target = "pressroom::print",
            handle = %handle,
            "Published artifact"
        );
        Ok(Ticket { handle })
    }

    /// Fetch a published artifact. The entry stays in the store.
    pub async fn retrieve(&self, handle: &str) -> Result<Delivery, PrintError> {
        let unknown = || PrintError::UnknownHandle {
            handle: handle.to_string(),
        };
        let artifact = self.store.lookup(handle).ok_or_else(unknown)?;

        let (content, content_length) = match self.storage.open(&artifact.storage).await {
            Ok(opened) => opened,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(unknown()),
            Err(err) => return Err(TempStorageError::from(err).into()),
        };

        Ok(Delivery {
            content,
            content_length,
            content_type: artifact.content_type().to_string(),
            file_name: self.file_name(&artifact.naming, artifact.suffix()),
        })
    }

    /// Renderer capabilities plus the entry points callers should use.
    pub fn capabilities(&self, app: Option<&str>, base_url: &str) -> Value {
        let mut document = match self.renderer.capabilities(app) {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("capabilities".to_string(), other);
                map
            }
        };
        document.insert(
            "printURL".to_string(),
            Value::String(format!("{base_url}/print.pdf")),
        );
        document.insert(
            "createURL".to_string(),
            Value::String(format!("{base_url}/create.json")),
        );
        if let Some(app) = app {
            document.insert("app".to_string(), Value::String(app.to_string()));
        }
        Value::Object(document)
    }

    /// Headers the renderer gets to see for this request.
    pub fn forwarded_headers(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> ForwardedHeaders {
        let mut forwarded = ForwardedHeaders::new();
        for name in &self.settings.forward_headers {
            if let Some(value) = headers.get(name.as_str()).and_then(|v| v.to_str().ok()) {
                forwarded.insert(name, value);
            }
        }

        if self.settings.add_forwarded_for {
            let client = headers
                .get(FORWARDED_FOR)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .or_else(|| peer.map(|peer| peer.ip().to_string()));
            if let Some(client) = client {
                debug!(target = "pressroom::print", client = %client, "Forwarded for");
                forwarded.insert(FORWARDED_FOR, client);
            }
        }

        forwarded
    }

    async fn render_job(
        &self,
        request: PrintRequest,
    ) -> Result<(PrintSpec, OutputFormat, PendingArtifact), PrintError> {
        let spec = self.parse_spec(request.spec)?;
        let headers = self.forwarded_headers(&request.headers, request.peer);

        let format = self
            .renderer
            .output_format(&spec)
            .inspect_err(|err| record_failure(err))?;
        let storage = self.storage.clone();
        let suffix = format.file_suffix.clone();
        let pending = task::spawn_blocking(move || storage.create(&suffix))
            .await
            .map_err(|err| TempStorageError::from(io::Error::other(err)))??;

        // dropping `pending` on the error path deletes the partial file
        self.render_into(&spec, &headers, &pending).await?;
        Ok((spec, format, pending))
    }

    async fn render_into(
        &self,
        spec: &PrintSpec,
        headers: &ForwardedHeaders,
        pending: &PendingArtifact,
    ) -> Result<(), PrintError> {
        let mut writer = pending.writer().map_err(TempStorageError::from)?;
        let started = Instant::now();

        let result = async {
            self.renderer.render(spec, headers, &mut writer).await?;
            writer.flush().await?;
            Ok::<(), RenderError>(())
        }
        .await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_RENDER_MS).record(elapsed_ms);

        match result {
            Ok(()) => {
                debug!(
                    target = "pressroom::print",
                    handle = %pending.handle(),
                    elapsed_ms,
                    "Rendered artifact"
                );
                Ok(())
            }
            Err(err) => {
                record_failure(&err);
                Err(err.into())
            }
        }
    }

    fn parse_spec(&self, payload: Option<SpecPayload>) -> Result<PrintSpec, PrintError> {
        let text = match payload {
            Some(SpecPayload::Text(text)) => text,
            Some(SpecPayload::Body(body)) => self.settings.encoding.decode(&body)?,
            None => return Err(PrintError::MissingSpec),
        };
        if text.trim().is_empty() {
            return Err(PrintError::MissingSpec);
        }
        Ok(PrintSpec::parse(&text)?)
    }

    fn file_name(&self, naming: &NamingHints, suffix: &str) -> String {
        let pattern = match &naming.output_name {
            Some(name) => name.clone(),
            None => self
                .renderer
                .output_file_name(naming.app.as_deref(), naming.layout.as_deref()),
        };
        format_file_name(&pattern, suffix, self.clock.now())
    }
}

fn record_failure(err: &RenderError) {
    counter!(METRIC_RENDER_FAILURES).increment(1);
    warn!(target = "pressroom::print", error = %err, "Render failed");
}
