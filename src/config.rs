//! Application configuration via environment variables.

use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub authorize_url: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub fhir_base_url: String,
    pub frontend_url: String,
    pub session_secret: String,
    pub port: u16,
    pub session_backend: String,
    pub dynamodb_table: String,
    pub dynamodb_endpoint: String,
    pub session_https_only: bool,
    pub cookie_domain: Option<String>,
    pub session_ttl_secs: u64,
    pub pending_timeout_secs: u64,
    pub sliding_expiry: bool,
    pub store_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required: `AUTH_CLIENT_ID`, `AUTH_AUTHORIZE_URL`, `AUTH_REDIRECT_URI`.
    /// All others have defaults suited to local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: required_env("AUTH_CLIENT_ID")?,
            authorize_url: required_env("AUTH_AUTHORIZE_URL")?,
            redirect_uri: required_env("AUTH_REDIRECT_URI")?,
            scopes: env::var("AUTH_SCOPES")
                .unwrap_or_else(|_| "openid fhirUser launch/patient patient/*.read".into()),
            fhir_base_url: env::var("FHIR_BASE_URL").unwrap_or_default(),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            session_secret: env::var("SESSION_SECRET")
                .unwrap_or_else(|_| "change-me-in-production".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3001),
            session_backend: env::var("SESSION_BACKEND").unwrap_or_else(|_| "memory".into()),
            dynamodb_table: env::var("DYNAMODB_TABLE").unwrap_or_else(|_| "sg_sessions".into()),
            dynamodb_endpoint: env::var("DYNAMODB_ENDPOINT").unwrap_or_default(),
            session_https_only: env::var("SESSION_HTTPS_ONLY")
                .map(|v| v == "true" || v == "1" || v == "True")
                .unwrap_or(false),
            cookie_domain: env::var("SESSION_COOKIE_DOMAIN").ok().filter(|v| !v.is_empty()),
            session_ttl_secs: env_u64("SESSION_TTL_SECS", 7200),
            pending_timeout_secs: env_u64("PENDING_TIMEOUT_SECS", 600),
            sliding_expiry: env::var("SESSION_SLIDING_EXPIRY")
                .map(|v| v != "false" && v != "0" && v != "False")
                .unwrap_or(true),
            store_timeout_ms: env_u64("STORE_TIMEOUT_MS", 5000),
        })
    }
}

/// Configuration for testing — all fields settable directly.
impl Config {
    pub fn test_default() -> Self {
        Self {
            client_id: "test-client-id".into(),
            authorize_url: "https://idp.example.com/oauth2/authorize".into(),
            redirect_uri: "http://localhost:3001/auth/callback".into(),
            scopes: "openid fhirUser launch/patient patient/*.read".into(),
            fhir_base_url: "https://fhir.example.com/api/FHIR/R4".into(),
            frontend_url: "http://localhost:3000".into(),
            session_secret: "test-secret-key".into(),
            port: 3001,
            session_backend: "memory".into(),
            dynamodb_table: "sg_sessions".into(),
            dynamodb_endpoint: String::new(),
            session_https_only: false,
            cookie_domain: None,
            session_ttl_secs: 7200,
            pending_timeout_secs: 600,
            sliding_expiry: true,
            store_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnv(key.into()))
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
