//! GET /auth/session

use axum::Json;

use crate::session::middleware::SessionHandle;
use crate::session::{AuthPhase, now_secs};
use crate::types::SessionView;

/// Read-only diagnostic view of the caller's session. Reading never
/// mutates the record, so no write or Set-Cookie results from this route.
pub async fn session_info(session: SessionHandle) -> Json<SessionView> {
    let record = session.record.lock().await;

    let pending_age_secs = match &record.phase {
        AuthPhase::Pending { issued_at, .. } => Some(now_secs().saturating_sub(*issued_at)),
        _ => None,
    };

    Json(SessionView {
        phase: record.phase.name(),
        authenticated: matches!(record.phase, AuthPhase::Authenticated { .. }),
        created_at: record.created_at,
        last_accessed_at: record.last_accessed_at,
        expires_at: record.expires_at,
        pending_age_secs,
    })
}
