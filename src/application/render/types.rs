use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWrite;

use crate::domain::{artifact::OutputFormat, spec::PrintSpec};

/// Request headers handed to the renderer, keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedHeaders {
    entries: BTreeMap<String, String>,
}

impl ForwardedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Failures surfaced by a renderer. The orchestrator treats all of them as
/// fatal for the job.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rendering failed: {message}")]
    Render { message: String },
    #[error("unsupported output format `{format}`")]
    Unsupported { format: String },
    #[error("renderer i/o failed")]
    Io(#[from] std::io::Error),
    #[error("rendering interrupted: {reason}")]
    Interrupted { reason: String },
}

impl RenderError {
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            reason: reason.into(),
        }
    }
}

/// Boundary to the engine that turns a print spec into document bytes.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Format the job will produce. Called before any bytes are written since
    /// the suffix is part of the storage name.
    fn output_format(&self, spec: &PrintSpec) -> Result<OutputFormat, RenderError>;

    /// Write the rendered document into `sink`.
    async fn render(
        &self,
        spec: &PrintSpec,
        headers: &ForwardedHeaders,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), RenderError>;

    /// Capability document advertised through `info.json`.
    fn capabilities(&self, app: Option<&str>) -> Value;

    /// Download name used when the spec carries no explicit one.
    fn output_file_name(&self, app: Option<&str>, layout: Option<&str>) -> String;
}
