//! HTTP error mapping
//!
//! Recoverable failures never escape the facade; whatever does reach this
//! layer is pattern-matched into a status code and a single JSON object.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use rategate::RateError;

/// Errors surfaced by the HTTP layer
#[derive(Debug)]
pub enum AppError {
    /// Malformed or missing request parameters (400)
    Validation(String),

    /// Engine or upstream failure
    Rate(RateError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::Rate(err) => err.fmt(f),
        }
    }
}

impl From<RateError> for AppError {
    fn from(err: RateError) -> Self {
        Self::Rate(err)
    }
}

impl AppError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Rate(err) => match err {
                // Preserve the upstream status code
                RateError::Api { code, .. } => {
                    StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
                }
                RateError::BreakerOpen | RateError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// User-safe message, without implementation details
    fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Rate(RateError::Api { code, .. }) => format!("upstream returned {code}"),
            Self::Rate(RateError::BreakerOpen | RateError::Unavailable) => {
                "rate temporarily unavailable".into()
            }
            Self::Rate(_) => "internal server error".into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match status {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE => {
                tracing::error!(error = %self, "request failed");
            }
            StatusCode::BAD_REQUEST => {
                tracing::warn!(error = %self, "request rejected");
            }
            _ => {
                tracing::info!(error = %self, "request failed upstream");
            }
        }
        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }
}
