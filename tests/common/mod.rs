//! Test utilities: app builders over a shared in-memory store, request
//! and response helpers.

#![allow(dead_code)]

use smart_auth_gateway::config::Config;
use smart_auth_gateway::session::memory::InMemoryStore;
use smart_auth_gateway::session::middleware::SessionLayer;
use smart_auth_gateway::session::{AnyStore, SessionManager};
use smart_auth_gateway::{AppState, create_app};
use std::sync::Arc;

pub fn memory_store() -> Arc<AnyStore> {
    Arc::new(AnyStore::Memory(InMemoryStore::new()))
}

/// Build an app over a given store. Two apps sharing one store behave
/// like two worker processes behind a load balancer.
pub fn build_app_with_store(config: Config, store: Arc<AnyStore>) -> (axum::Router, Arc<AppState>) {
    let manager = SessionManager::new(store, config.session_ttl_secs, config.sliding_expiry);
    let session_layer = Arc::new(SessionLayer {
        manager,
        secret: config.session_secret.clone(),
        https_only: config.session_https_only,
        cookie_domain: config.cookie_domain.clone(),
    });

    let state = Arc::new(AppState {
        config,
        session_layer,
    });

    let app = create_app(state.clone());
    (app, state)
}

pub fn build_test_app() -> (axum::Router, Arc<AppState>) {
    build_app_with_store(Config::test_default(), memory_store())
}

/// Cookie header value for a signed session id.
pub fn session_cookie(secret: &str, session_id: &str) -> String {
    let signed =
        smart_auth_gateway::session::cookie::sign_session_id(secret.as_bytes(), session_id);
    format!("sg_session={signed}")
}

/// Pull the session id out of a Set-Cookie header, verifying the signature.
pub fn extract_session_id(response: &axum::response::Response, secret: &str) -> Option<String> {
    let value = response
        .headers()
        .get("set-cookie")?
        .to_str()
        .ok()?
        .split(';')
        .next()?
        .strip_prefix("sg_session=")?
        .to_string();
    smart_auth_gateway::session::cookie::verify_cookie(secret.as_bytes(), &value)
}

/// Location header of a redirect response.
pub fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Decoded value of a query parameter in a URL.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    for pair in query.split('&') {
        let (k, v) = pair.split_once('=')?;
        if k == name {
            return Some(urlencoding::decode(v).ok()?.into_owned());
        }
    }
    None
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
