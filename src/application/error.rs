use std::error::Error as StdError;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::print::PrintError, domain::error::DomainError, infra::error::InfraError,
};

/// First line of every error body.
pub const ERROR_PREAMBLE: &str = "Error while generating PDF:";

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Plain-text error response: the preamble followed by one line per message
/// of the error chain.
#[derive(Debug)]
pub struct HttpError {
    report: ErrorReport,
}

impl HttpError {
    pub fn new(source: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            report: ErrorReport::from_message(source, status, message),
        }
    }

    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        Self {
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.report.status
    }

    pub fn body(&self) -> String {
        let mut body = String::from(ERROR_PREAMBLE);
        for message in &self.report.messages {
            body.push('\n');
            body.push_str(message);
        }
        body
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = self.body();
        let mut response = (
            self.report.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<PrintError> for HttpError {
    fn from(error: PrintError) -> Self {
        const SOURCE: &str = "application::print";
        let status = match &error {
            PrintError::MissingSpec | PrintError::Domain(DomainError::Validation { .. }) => {
                StatusCode::BAD_REQUEST
            }
            PrintError::UnknownHandle { .. } => StatusCode::NOT_FOUND,
            PrintError::Render(_)
            | PrintError::Storage(_)
            | PrintError::Domain(DomainError::Invariant { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        HttpError::from_error(SOURCE, status, &error)
    }
}

/// Errors that end the process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
