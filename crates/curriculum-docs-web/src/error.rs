//! Error responses for the HTTP layer.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use curriculum_docs_core::Error;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Longest converter diagnostics excerpt returned to clients
const MAX_DIAGNOSTICS_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request itself is invalid
    #[error("{0}")]
    BadRequest(String),

    /// The request was valid but could not be served
    #[error("{0}")]
    Internal(String),

    /// A core operation failed; the status follows the error kind
    #[error(transparent)]
    Core(#[from] Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Core(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Internal(_) | Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Core(e @ Error::ConversionFailed { .. }) => match e.diagnostics() {
                Some(diagnostics) => {
                    format!("{e}\n{}", truncate_chars(diagnostics, MAX_DIAGNOSTICS_CHARS))
                }
                None => e.to_string(),
            },
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();

        if status.is_server_error() {
            match &self {
                Self::Core(e) => match e.diagnostics() {
                    Some(diagnostics) => error!("{}\n{}", e, diagnostics),
                    None => error!("{}", e),
                },
                other => error!("{}", other),
            }
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    text.char_indices().nth(max).map_or(text, |(end, _)| &text[..end])
}
