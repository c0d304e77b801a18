//! Axum session middleware layer.
//!
//! Extracts the signed session id from the cookie, loads the record through
//! the manager, and exposes it to handlers via request extensions. After
//! the handler returns, the middleware persists changes and emits the
//! matching Set-Cookie header.
//!
//! The session travels through request extensions:
//! - `SessionHandle` — shared mutable access to the record
//! - Route handlers mutate the record (or flag destruction) via the handle
//! - The middleware compares against the loaded snapshot afterwards and
//!   writes only when something changed

use axum::extract::{FromRequestParts, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::cookie::{sign_session_id, verify_cookie};
use super::{SessionManager, SessionRecord, SessionStore, random_token};
use crate::error::AppError;

pub const COOKIE_NAME: &str = "sg_session";

/// Shared handle to session state, inserted into request extensions.
///
/// `version` is the store version the record was loaded at, 0 for a
/// session that has not been persisted yet. Handlers that commit the
/// record themselves set `persisted` so the middleware does not write a
/// second, unguarded copy on top.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub version: u64,
    pub record: Arc<Mutex<SessionRecord>>,
    pub destroyed: Arc<Mutex<bool>>,
    pub persisted: Arc<Mutex<bool>>,
}

impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or(AppError::Internal("session middleware not configured".into()))
    }
}

impl SessionHandle {
    fn new(id: String, version: u64, record: SessionRecord) -> Self {
        Self {
            id,
            version,
            record: Arc::new(Mutex::new(record)),
            destroyed: Arc::new(Mutex::new(false)),
            persisted: Arc::new(Mutex::new(false)),
        }
    }

    /// Truncated identifier for log lines; the full id is a credential.
    pub fn id_prefix(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }
}

/// Session middleware configuration.
pub struct SessionLayer<S: SessionStore> {
    pub manager: SessionManager<S>,
    pub secret: String,
    pub https_only: bool,
    pub cookie_domain: Option<String>,
}

/// Axum middleware function for session handling.
///
/// A store failure during load or the post-handler write turns into the
/// 503 response directly; handlers never observe a half-loaded session.
pub async fn session_middleware<S: SessionStore + 'static>(
    layer: Arc<SessionLayer<S>>,
    mut req: Request,
    next: Next,
) -> Response {
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let session_id = parse_cookie(cookie_header, COOKIE_NAME)
        .and_then(|v| verify_cookie(layer.secret.as_bytes(), v));

    let handle = match session_id {
        Some(id) => match layer.manager.load(&id).await {
            Ok(Some((record, version))) => SessionHandle::new(id, version, record),
            // Missing, expired, or undecodable: start over with a fresh id
            // so a stale cookie cannot pin a dead identifier.
            Ok(None) => SessionHandle::new(
                random_token(),
                0,
                SessionRecord::new(layer.manager.ttl_secs()),
            ),
            Err(e) => return AppError::from(e).into_response(),
        },
        None => SessionHandle::new(
            random_token(),
            0,
            SessionRecord::new(layer.manager.ttl_secs()),
        ),
    };

    let initial = handle.record.lock().await.clone();
    let loaded_version = handle.version;
    req.extensions_mut().insert(handle.clone());

    let mut response = next.run(req).await;

    let destroyed = *handle.destroyed.lock().await;
    let persisted = *handle.persisted.lock().await;
    let mut current = handle.record.lock().await.clone();

    let domain = layer.cookie_domain.as_deref();
    let ttl = layer.manager.ttl_secs();

    if destroyed {
        if let Err(e) = layer.manager.destroy(&handle.id).await {
            tracing::error!(session = handle.id_prefix(), error = %e, "session destroy failed");
            return AppError::from(e).into_response();
        }
        let cookie = make_delete_cookie(layer.https_only, domain);
        response
            .headers_mut()
            .append(header::SET_COOKIE, cookie.parse().unwrap());
    } else if persisted {
        // Handler committed the record itself (version-checked write); only
        // the cookie is still our job.
        let cookie = make_set_cookie(&layer.secret, &handle.id, ttl, layer.https_only, domain);
        response
            .headers_mut()
            .append(header::SET_COOKIE, cookie.parse().unwrap());
    } else if current != initial {
        // Only persist when the handler actually modified the session.
        // Without this check every anonymous request (including GET /health)
        // would mint a record in the store and set a cookie.
        let write = if loaded_version == 0 {
            layer.manager.persist_new(handle.id.clone(), &current).await
        } else {
            layer
                .manager
                .save(&handle.id, &mut current, loaded_version)
                .await
                .map(|_| handle.id.clone())
        };
        match write {
            Ok(stored_id) => {
                let cookie =
                    make_set_cookie(&layer.secret, &stored_id, ttl, layer.https_only, domain);
                response
                    .headers_mut()
                    .append(header::SET_COOKIE, cookie.parse().unwrap());
            }
            Err(e) => {
                tracing::error!(session = handle.id_prefix(), error = %e, "session save failed");
                return AppError::from(e).into_response();
            }
        }
    }

    response
}

fn make_set_cookie(
    secret: &str,
    session_id: &str,
    max_age_secs: u64,
    https_only: bool,
    cookie_domain: Option<&str>,
) -> String {
    let signed = sign_session_id(secret.as_bytes(), session_id);
    let mut parts = vec![
        format!("{COOKIE_NAME}={signed}"),
        format!("Max-Age={max_age_secs}"),
        "Path=/".into(),
        "HttpOnly".into(),
        "SameSite=Lax".into(),
    ];
    if https_only {
        parts.push("Secure".into());
    }
    if let Some(domain) = cookie_domain {
        parts.push(format!("Domain={domain}"));
    }
    parts.join("; ")
}

fn make_delete_cookie(https_only: bool, cookie_domain: Option<&str>) -> String {
    let mut parts = vec![
        format!("{COOKIE_NAME}="),
        "Max-Age=0".into(),
        "Path=/".into(),
        "HttpOnly".into(),
        "SameSite=Lax".into(),
    ];
    if https_only {
        parts.push("Secure".into());
    }
    if let Some(domain) = cookie_domain {
        parts.push(format!("Domain={domain}"));
    }
    parts.join("; ")
}

/// Parse a specific cookie from a Cookie header value.
fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let trimmed = part.trim();
        if let Some(value) = trimmed.strip_prefix(name)
            && let Some(value) = value.strip_prefix('=')
        {
            return Some(value);
        }
    }
    None
}
