//! Artifact records held by the store.

use std::path::{Path, PathBuf};

use time::OffsetDateTime;

/// Output format declared by the renderer for a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    /// Canonical file extension without a leading dot (`pdf`, `png`).
    pub file_suffix: String,
    /// MIME type served with the artifact.
    pub content_type: String,
}

impl OutputFormat {
    pub fn new(file_suffix: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            file_suffix: file_suffix.into(),
            content_type: content_type.into(),
        }
    }
}

/// Opaque reference to the physical bytes of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRef(PathBuf);

impl StorageRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Naming metadata captured from the print spec, consumed at retrieval time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingHints {
    /// Explicit file name pattern requested by the caller.
    pub output_name: Option<String>,
    /// Layout the document was printed with; fallback name source.
    pub layout: Option<String>,
    /// Application variant the renderer was selected for.
    pub app: Option<String>,
}

/// A rendered artifact that has not been published yet.
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    pub handle: String,
    pub storage: StorageRef,
    pub format: OutputFormat,
    pub naming: NamingHints,
}

/// A published artifact. Every field is fixed once the store stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub handle: String,
    pub created_at: OffsetDateTime,
    pub storage: StorageRef,
    pub format: OutputFormat,
    pub naming: NamingHints,
}

impl Artifact {
    pub fn from_draft(draft: ArtifactDraft, created_at: OffsetDateTime) -> Self {
        let ArtifactDraft {
            handle,
            storage,
            format,
            naming,
        } = draft;

        Self {
            handle,
            created_at,
            storage,
            format,
            naming,
        }
    }

    pub fn content_type(&self) -> &str {
        &self.format.content_type
    }

    pub fn suffix(&self) -> &str {
        &self.format.file_suffix
    }
}
