//! Application error types with Axum response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Session store unavailable")]
    BackendUnavailable,

    #[error("CSRF validation failed")]
    CsrfFailed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::BackendUnavailable => AppError::BackendUnavailable,
            // Handlers that issue version-checked writes handle the conflict
            // themselves; one reaching this point is a bug.
            SessionError::VersionConflict => {
                AppError::Internal("unexpected session version conflict".into())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::BackendUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": "Session store unavailable"}),
            ),
            AppError::CsrfFailed => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": "CSRF validation failed",
                    "message": "Missing X-SG-CSRF header"
                }),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": msg})),
        };

        (status, axum::Json(body)).into_response()
    }
}
