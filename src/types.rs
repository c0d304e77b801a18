//! Response body types for the JSON surface.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub store_status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Read-only view of the caller's session for the diagnostic endpoint.
/// Never exposes the state token, verifier, or claims.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub phase: &'static str,
    pub authenticated: bool,
    pub created_at: u64,
    pub last_accessed_at: u64,
    pub expires_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_age_secs: Option<u64>,
}
