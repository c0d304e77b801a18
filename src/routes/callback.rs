//! GET /auth/callback

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::session::middleware::SessionHandle;
use crate::session::{AuthPhase, SessionError, now_secs};

/// Query parameters from the identity provider's redirect.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Complete the authorization-code leg.
///
/// Any rejection resets the session to anonymous and bounces to the
/// frontend login page with an error message, never a bare error page.
/// The commit to the authenticated phase is a version-checked write: if a
/// concurrent request to the same session won the race, this callback
/// loses cleanly instead of overwriting the winner.
pub async fn oauth_callback(
    State(state): State<Arc<crate::AppState>>,
    session: SessionHandle,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let frontend = &state.config.frontend_url;

    if let Some(ref error) = params.error {
        let msg = params.error_description.as_deref().unwrap_or(error);
        tracing::warn!(session = session.id_prefix(), error = %error, "provider returned error");
        return Ok(reject(&session, frontend, msg).await);
    }

    let code = match params.code.as_deref() {
        Some(c) if !c.is_empty() => c,
        _ => return Ok(reject(&session, frontend, "Missing authorization code").await),
    };
    let presented_state = match params.state.as_deref() {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(reject(&session, frontend, "Missing state parameter").await),
    };

    let (expected_state, verifier, redirect, issued_at) = {
        let record = session.record.lock().await;
        match &record.phase {
            AuthPhase::Pending {
                state,
                verifier,
                redirect,
                issued_at,
            } => (
                state.clone(),
                verifier.clone(),
                redirect.clone(),
                *issued_at,
            ),
            // Fresh, anonymous, or already-authenticated session: there is
            // no pending attempt this callback could belong to.
            _ => return Ok(reject(&session, frontend, "No login attempt in progress").await),
        }
    };

    if presented_state != expected_state {
        tracing::warn!(session = session.id_prefix(), "state token mismatch");
        return Ok(reject(&session, frontend, "State mismatch").await);
    }

    let age = now_secs().saturating_sub(issued_at);
    if age > state.config.pending_timeout_secs {
        tracing::info!(session = session.id_prefix(), age, "pending attempt timed out");
        return Ok(reject(&session, frontend, "Login attempt expired, please retry").await);
    }

    // The token exchange happens downstream; the claims carry what it
    // needs. The verifier leaves the pending phase here and nowhere else.
    let mut claims = serde_json::Map::new();
    claims.insert("code".into(), serde_json::Value::String(code.to_string()));
    claims.insert("code_verifier".into(), serde_json::Value::String(verifier));

    let mut committed = session.record.lock().await.clone();
    committed.phase = AuthPhase::Authenticated {
        claims,
        authenticated_at: now_secs(),
    };

    match state
        .session_layer
        .manager
        .save_checked(&session.id, session.version, &mut committed)
        .await
    {
        Ok(_) => {
            *session.record.lock().await = committed;
            *session.persisted.lock().await = true;
            tracing::info!(session = session.id_prefix(), "session authenticated");
            Ok(Redirect::temporary(&format!("{frontend}{redirect}")).into_response())
        }
        Err(SessionError::VersionConflict) => {
            // A concurrent write superseded this attempt. Leave the stored
            // record alone.
            *session.persisted.lock().await = true;
            tracing::warn!(session = session.id_prefix(), "callback superseded by concurrent update");
            Ok(error_redirect(frontend, "Login superseded by a newer attempt"))
        }
        Err(SessionError::BackendUnavailable) => Err(AppError::BackendUnavailable),
    }
}

/// Reset the session to anonymous and bounce to the login page. The reset
/// invalidates the state token, so a replayed callback cannot match twice.
async fn reject(session: &SessionHandle, frontend: &str, msg: &str) -> Response {
    session.record.lock().await.phase = AuthPhase::Anonymous;
    error_redirect(frontend, msg)
}

fn error_redirect(frontend: &str, msg: &str) -> Response {
    Redirect::temporary(&format!("{frontend}/login?error={}", urlencoding::encode(msg)))
        .into_response()
}
