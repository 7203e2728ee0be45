use thiserror::Error;

/// Rejections raised while interpreting caller input or naming artifacts.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The caller sent something unusable; reported as a client error.
    #[error("invalid print spec: {message}")]
    Validation { message: String },
    /// Internal naming rules were broken; reported as a server error.
    #[error("artifact naming invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
