//! Request-level failures and their HTTP mapping.
//!
//! Callers only ever see a status code: error responses carry an empty body
//! so nothing about the rejection reason leaks to an untrusted sender.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors that terminate a webhook request early.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    /// Handshake query is missing a parameter or the challenge is not an integer.
    #[error("malformed handshake request: {0}")]
    MalformedHandshake(&'static str),

    /// Handshake mode is not `subscribe` or the verify token does not match.
    #[error("untrusted handshake: {0}")]
    UntrustedHandshake(&'static str),

    /// Signature header missing, malformed or not matching the body.
    #[error("invalid delivery signature")]
    InvalidSignature,

    /// Body is not JSON or not shaped like a delivery envelope.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MalformedHandshake(_) | WebhookError::MalformedPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::UntrustedHandshake(_) | WebhookError::InvalidSignature => {
                StatusCode::FORBIDDEN
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        self.status_code().into_response()
    }
}
