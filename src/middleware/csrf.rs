//! CSRF validation: require `X-SG-CSRF: 1` header on state-changing requests.
//!
//! Browsers do not attach custom headers to cross-site form posts, so the
//! header's presence proves the request came from our frontend code.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;

/// Axum middleware that requires the `X-SG-CSRF: 1` header.
pub async fn require_csrf(req: Request, next: Next) -> Result<Response, impl IntoResponse> {
    if req.headers().get("x-sg-csrf").and_then(|v| v.to_str().ok()) != Some("1") {
        return Err(AppError::CsrfFailed);
    }
    Ok(next.run(req).await)
}
