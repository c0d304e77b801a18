//! POST /auth/logout

use axum::Json;

use crate::session::AuthPhase;
use crate::session::middleware::SessionHandle;
use crate::types::SuccessResponse;

/// Destroy the caller's session. Succeeds even when no session exists;
/// logging out twice is not an error.
pub async fn logout(session: SessionHandle) -> Json<SuccessResponse> {
    tracing::info!(session = session.id_prefix(), "logout");
    session.record.lock().await.phase = AuthPhase::Anonymous;
    *session.destroyed.lock().await = true;
    Json(SuccessResponse { success: true })
}
