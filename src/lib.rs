//! SMART auth gateway — shared-session OAuth front end for deployments
//! where any of several stateless workers may serve any request.
//!
//! All session state lives in an external store behind `SessionStore`;
//! the worker that answers the provider's callback need not be the one
//! that started the login.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod types;

use axum::Router;
use axum::middleware::from_fn;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::session::AnyStore;
use crate::session::middleware::{SessionLayer, session_middleware};

/// Shared application state available to all route handlers.
pub struct AppState {
    pub config: Config,
    pub session_layer: Arc<SessionLayer<AnyStore>>,
}

/// Build the Axum router with all middleware and routes.
pub fn create_app(state: Arc<AppState>) -> Router {
    let session_layer = state.session_layer.clone();

    // CORS: allow the single frontend origin with credentials
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(
            state.config.frontend_url.parse().unwrap(),
        ))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("x-sg-csrf"),
        ])
        .allow_credentials(true);

    // Auth routes that require CSRF protection
    let csrf_routes = Router::new()
        .route("/logout", axum::routing::post(routes::logout::logout))
        .layer(from_fn(crate::middleware::csrf::require_csrf));

    // Auth routes without CSRF: top-level navigations the browser makes
    // directly (login redirect, provider callback) plus the read-only view
    let open_auth_routes = Router::new()
        .route("/login", axum::routing::get(routes::login::login))
        .route("/callback", axum::routing::get(routes::callback::oauth_callback))
        .route("/session", axum::routing::get(routes::session::session_info));

    let auth_routes = Router::new().merge(csrf_routes).merge(open_auth_routes);

    Router::new()
        .route("/health", axum::routing::get(routes::health::health))
        .nest("/auth", auth_routes)
        .layer(from_fn(move |req, next| {
            let layer = session_layer.clone();
            session_middleware(layer, req, next)
        }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
