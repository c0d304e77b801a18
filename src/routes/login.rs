//! GET /auth/login

use axum::extract::{Query, State};
use axum::response::Redirect;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::session::middleware::SessionHandle;
use crate::session::{AuthPhase, now_secs, random_token};

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    pub next: Option<String>,
}

/// Begin the authorization-code leg: mint the state token and PKCE
/// verifier, park them in the session, and redirect to the provider.
///
/// Starting over while a previous attempt is pending simply replaces it;
/// the old state token becomes useless.
pub async fn login(
    State(state): State<Arc<crate::AppState>>,
    session: SessionHandle,
    Query(params): Query<LoginParams>,
) -> Redirect {
    let redirect = sanitize_next(params.next.as_deref());
    let state_token = random_token();
    let verifier = random_token();
    let challenge = pkce_challenge(&verifier);

    {
        let mut record = session.record.lock().await;
        record.phase = AuthPhase::Pending {
            state: state_token.clone(),
            verifier,
            redirect,
            issued_at: now_secs(),
        };
    }

    tracing::info!(session = session.id_prefix(), "authorization redirect issued");

    let url = authorize_redirect_url(&state.config, &state_token, &challenge);
    Redirect::temporary(&url)
}

/// Only same-origin absolute paths survive; anything else falls back to
/// the frontend root. `//host` would be scheme-relative, hence the
/// double-slash check.
fn sanitize_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => "/".to_string(),
    }
}

/// RFC 7636 S256 code challenge.
fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn authorize_redirect_url(config: &crate::config::Config, state_token: &str, challenge: &str) -> String {
    let mut url = format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
        config.authorize_url,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(&config.scopes),
        urlencoding::encode(state_token),
        urlencoding::encode(challenge),
    );
    // SMART servers require the audience of the eventual access token.
    if !config.fhir_base_url.is_empty() {
        url.push_str("&aud=");
        url.push_str(&urlencoding::encode(&config.fhir_base_url));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_next_accepts_paths() {
        assert_eq!(sanitize_next(Some("/dashboard")), "/dashboard");
        assert_eq!(sanitize_next(Some("/a/b?c=d")), "/a/b?c=d");
    }

    #[test]
    fn test_sanitize_next_rejects_external_targets() {
        assert_eq!(sanitize_next(Some("https://evil.example")), "/");
        assert_eq!(sanitize_next(Some("//evil.example")), "/");
        assert_eq!(sanitize_next(Some("dashboard")), "/");
        assert_eq!(sanitize_next(None), "/");
    }

    #[test]
    fn test_pkce_challenge_rfc7636_vector() {
        // Appendix B of RFC 7636.
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_authorize_url_carries_required_params() {
        let config = crate::config::Config::test_default();
        let url = authorize_redirect_url(&config, "st-token", "challenge-x");

        assert!(url.starts_with("https://idp.example.com/oauth2/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=test-client-id"));
        assert!(url.contains("state=st-token"));
        assert!(url.contains("code_challenge=challenge-x"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("aud=https%3A%2F%2Ffhir.example.com%2Fapi%2FFHIR%2FR4"));
    }

    #[test]
    fn test_authorize_url_omits_aud_without_fhir_base() {
        let mut config = crate::config::Config::test_default();
        config.fhir_base_url = String::new();
        let url = authorize_redirect_url(&config, "st", "ch");
        assert!(!url.contains("aud="));
    }
}
