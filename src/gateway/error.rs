use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::agent::InvokeError;

/// Everything that can end a gateway request early.
///
/// Every variant renders as `{"error": "<message>"}` with the matching status.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Unsupported Media Type. Please use application/json or multipart/form-data.")]
    UnsupportedMediaType,

    #[error("Missing message or sessionId")]
    MissingFields,

    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("Invalid imageBase64: {0}")]
    InvalidImage(String),

    /// An axum extractor refused the body (size limit, malformed multipart).
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    /// Waiting for the session plus the model call exceeded `gateway.request_timeout_secs`.
    #[error("Chat request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ChatError {
    /// Keep an extractor rejection's status and text.
    pub fn from_rejection<R>(rejection: R) -> Self
    where
        R: IntoResponse + Display,
    {
        let message = rejection.to_string();
        let status = rejection.into_response().status();
        Self::Rejected { status, message }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::MissingFields | Self::InvalidJson(_) | Self::InvalidImage(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Rejected { status, .. } => *status,
            Self::Timeout(_) | Self::Invoke(_) | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing text. Server-side failures are scrubbed of anything that looks like a key.
    pub fn public_message(&self) -> String {
        match self {
            Self::Invoke(_) | Self::Store(_) => {
                crate::providers::sanitize_api_error(&self.to_string())
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            tracing::debug!(status = status.as_u16(), "Rejected request: {self}");
        }
        let body = serde_json::json!({ "error": self.public_message() });
        (status, Json(body)).into_response()
    }
}
