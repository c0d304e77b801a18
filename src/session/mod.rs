//! Server-side session management.
//!
//! `SessionRecord` is the unit stored per browser session, `SessionStore`
//! is the pluggable persistence trait, and `SessionManager` centralizes
//! identifier generation, expiry enforcement, and optimistic versioning so
//! that every worker process observes identical session semantics.

pub mod cookie;
pub mod dynamodb;
pub mod memory;
pub mod middleware;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a session is in the authorization-code leg.
///
/// A tagged union instead of an open key-value map: only the fields valid
/// for the current phase exist at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum AuthPhase {
    /// No authorization in flight.
    Anonymous,
    /// A redirect to the identity provider has been issued and not yet
    /// completed. `state` is the CSRF token round-tripped through the
    /// provider, `verifier` the PKCE verifier for the later token exchange,
    /// `redirect` the post-login target.
    Pending {
        state: String,
        verifier: String,
        redirect: String,
        issued_at: u64,
    },
    /// The provider's callback presented the matching state token.
    Authenticated {
        claims: serde_json::Map<String, serde_json::Value>,
        authenticated_at: u64,
    },
}

impl AuthPhase {
    pub fn name(&self) -> &'static str {
        match self {
            AuthPhase::Anonymous => "anonymous",
            AuthPhase::Pending { .. } => "pending",
            AuthPhase::Authenticated { .. } => "authenticated",
        }
    }
}

/// One session as persisted in the store. Writes are always full-record
/// overwrites; two concurrent writers never interleave partial data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub phase: AuthPhase,
    pub created_at: u64,
    pub last_accessed_at: u64,
    pub expires_at: u64,
}

impl SessionRecord {
    /// Fresh anonymous record with a full TTL ahead of it.
    pub fn new(ttl_secs: u64) -> Self {
        let now = now_secs();
        Self {
            phase: AuthPhase::Anonymous,
            created_at: now,
            last_accessed_at: now,
            expires_at: now + ttl_secs,
        }
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// 256-bit random value, base64url-encoded. Used for session identifiers,
/// CSRF state tokens, and PKCE verifiers.
pub fn random_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Write precondition for `SessionStore::save`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteGuard {
    /// Unconditional upsert, storing the given version (last-write-wins).
    Overwrite(u64),
    /// Only if the key does not exist yet; stores version 1.
    IfAbsent,
    /// Only if the stored version matches; stores version + 1.
    IfVersion(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("session store call timed out")]
    Timeout,
    #[error("write precondition failed")]
    VersionConflict,
}

impl StoreError {
    /// Whether a single bounded retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout)
    }
}

// RPITIT instead of the async_trait macro; requires implementations to be
// Send + Sync for use from Axum handlers.

/// Pluggable session persistence. Implementations must provide
/// read-after-write visibility for a single key across processes and apply
/// a client-side timeout to every network call.
pub trait SessionStore: Send + Sync {
    /// Load a record and its version. `None` for a missing key. Expiry is
    /// the manager's concern; stores may return past-due records.
    fn load(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<(SessionRecord, u64)>, StoreError>> + Send;

    /// Atomic full-record upsert under the given precondition. Returns the
    /// stored version.
    fn save(
        &self,
        session_id: &str,
        record: &SessionRecord,
        guard: WriteGuard,
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;

    /// Remove a record. Absent keys are not an error.
    fn delete(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Cheap reachability probe for the diagnostic surface.
    fn ping(&self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Type-erased store supporting both InMemory and DynamoDB.
///
/// `SessionStore` uses RPITIT and is not object-safe, so this enum
/// dispatches manually instead.
pub enum AnyStore {
    Memory(memory::InMemoryStore),
    DynamoDb(dynamodb::DynamoDbStore),
}

impl AnyStore {
    pub fn kind(&self) -> &'static str {
        match self {
            AnyStore::Memory(_) => "memory",
            AnyStore::DynamoDb(_) => "dynamodb",
        }
    }
}

impl SessionStore for AnyStore {
    async fn load(&self, session_id: &str) -> Result<Option<(SessionRecord, u64)>, StoreError> {
        match self {
            AnyStore::Memory(s) => s.load(session_id).await,
            AnyStore::DynamoDb(s) => s.load(session_id).await,
        }
    }

    async fn save(
        &self,
        session_id: &str,
        record: &SessionRecord,
        guard: WriteGuard,
    ) -> Result<u64, StoreError> {
        match self {
            AnyStore::Memory(s) => s.save(session_id, record, guard).await,
            AnyStore::DynamoDb(s) => s.save(session_id, record, guard).await,
        }
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        match self {
            AnyStore::Memory(s) => s.delete(session_id).await,
            AnyStore::DynamoDb(s) => s.delete(session_id).await,
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self {
            AnyStore::Memory(s) => s.ping().await,
            AnyStore::DynamoDb(s) => s.ping().await,
        }
    }
}

/// Errors the manager exposes to request handlers. Decoding and expiry
/// anomalies never appear here; they normalize to a missing session.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("session store unavailable")]
    BackendUnavailable,
    #[error("session was updated concurrently")]
    VersionConflict,
}

/// Maximum fresh identifiers tried when a new session id collides.
const MAX_ID_ATTEMPTS: usize = 3;

/// Issues session identifiers, enforces expiry, and mediates all store
/// access. Handlers see exactly two outcomes per load: a live record or a
/// clean slate.
pub struct SessionManager<S: SessionStore> {
    store: Arc<S>,
    ttl_secs: u64,
    sliding_expiry: bool,
}

impl<S: SessionStore> SessionManager<S> {
    pub fn new(store: Arc<S>, ttl_secs: u64, sliding_expiry: bool) -> Self {
        Self {
            store,
            ttl_secs,
            sliding_expiry,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create and persist a fresh anonymous session.
    pub async fn create(&self) -> Result<(String, SessionRecord), SessionError> {
        let record = SessionRecord::new(self.ttl_secs);
        let id = self.persist_new(random_token(), &record).await?;
        Ok((id, record))
    }

    /// Persist a record under a brand-new identifier, preferring
    /// `preferred_id` (already handed to the request) and regenerating on
    /// collision. Returns the identifier actually stored.
    pub async fn persist_new(
        &self,
        preferred_id: String,
        record: &SessionRecord,
    ) -> Result<String, SessionError> {
        let mut id = preferred_id;
        for attempt in 0..MAX_ID_ATTEMPTS {
            match self.save_with_retry(&id, record, WriteGuard::IfAbsent).await {
                Ok(_) => return Ok(id),
                Err(StoreError::VersionConflict) => {
                    tracing::warn!(attempt, "session id collision, regenerating");
                    id = random_token();
                }
                Err(_) => return Err(SessionError::BackendUnavailable),
            }
        }
        // Repeated collisions of 256-bit identifiers mean the store is
        // feeding us garbage, not that we are unlucky.
        tracing::error!("exhausted session id generation attempts");
        Err(SessionError::BackendUnavailable)
    }

    /// Load a session. Missing, expired, and undecodable records all come
    /// back as `None`; expired records are deleted best-effort.
    pub async fn load(
        &self,
        session_id: &str,
    ) -> Result<Option<(SessionRecord, u64)>, SessionError> {
        let loaded = match self.store.load(session_id).await {
            Ok(v) => v,
            Err(e) if e.is_transient() => self
                .store
                .load(session_id)
                .await
                .map_err(|_| SessionError::BackendUnavailable)?,
            Err(_) => return Err(SessionError::BackendUnavailable),
        };

        match loaded {
            Some((record, _)) if record.is_expired_at(now_secs()) => {
                if let Err(e) = self.store.delete(session_id).await {
                    tracing::debug!(error = %e, "failed to evict expired session");
                }
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Full overwrite, last-write-wins. Refreshes `last_accessed_at` and
    /// the expiry window.
    pub async fn save(
        &self,
        session_id: &str,
        record: &mut SessionRecord,
        loaded_version: u64,
    ) -> Result<u64, SessionError> {
        self.touch(record);
        self.save_with_retry(session_id, record, WriteGuard::Overwrite(loaded_version + 1))
            .await
            .map_err(|_| SessionError::BackendUnavailable)
    }

    /// Full overwrite that only lands if the stored version is still
    /// `expected_version`. Used for the pending-to-authenticated commit so a
    /// concurrent update to the same session loses cleanly instead of being
    /// silently overwritten.
    pub async fn save_checked(
        &self,
        session_id: &str,
        expected_version: u64,
        record: &mut SessionRecord,
    ) -> Result<u64, SessionError> {
        self.touch(record);
        match self
            .save_with_retry(session_id, record, WriteGuard::IfVersion(expected_version))
            .await
        {
            Ok(v) => Ok(v),
            Err(StoreError::VersionConflict) => Err(SessionError::VersionConflict),
            Err(_) => Err(SessionError::BackendUnavailable),
        }
    }

    /// Idempotent delete; an already-absent record is success.
    pub async fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        match self.store.delete(session_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => self
                .store
                .delete(session_id)
                .await
                .map_err(|_| SessionError::BackendUnavailable),
            Err(_) => Err(SessionError::BackendUnavailable),
        }
    }

    /// At most one retry, and only for transient failures. A version
    /// conflict is a definitive answer and must never be replayed blindly.
    async fn save_with_retry(
        &self,
        session_id: &str,
        record: &SessionRecord,
        guard: WriteGuard,
    ) -> Result<u64, StoreError> {
        match self.store.save(session_id, record, guard).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "retrying session write once");
                self.store.save(session_id, record, guard).await
            }
            other => other,
        }
    }

    /// Refresh access time and advance the expiry window. `expires_at`
    /// never regresses regardless of policy.
    fn touch(&self, record: &mut SessionRecord) {
        let now = now_secs();
        record.last_accessed_at = now;
        let candidate = if self.sliding_expiry {
            now + self.ttl_secs
        } else {
            record.created_at + self.ttl_secs
        };
        record.expires_at = record.expires_at.max(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryStore;
    use super::*;

    fn manager(ttl_secs: u64, sliding: bool) -> SessionManager<InMemoryStore> {
        SessionManager::new(Arc::new(InMemoryStore::new()), ttl_secs, sliding)
    }

    fn shared_managers(
        ttl_secs: u64,
    ) -> (SessionManager<InMemoryStore>, SessionManager<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (
            SessionManager::new(store.clone(), ttl_secs, true),
            SessionManager::new(store, ttl_secs, true),
        )
    }

    #[tokio::test]
    async fn test_create_then_load_from_second_worker() {
        // Two managers over one store simulate two worker processes.
        let (worker_a, worker_b) = shared_managers(3600);

        let (id, record) = worker_a.create().await.unwrap();
        let (loaded, version) = worker_b.load(&id).await.unwrap().unwrap();

        assert_eq!(loaded, record);
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn test_save_visible_to_other_worker() {
        let (worker_a, worker_b) = shared_managers(3600);
        let (id, mut record) = worker_a.create().await.unwrap();

        record.phase = AuthPhase::Pending {
            state: "st".into(),
            verifier: "vf".into(),
            redirect: "/".into(),
            issued_at: now_secs(),
        };
        worker_a.save(&id, &mut record, 1).await.unwrap();

        let (loaded, _) = worker_b.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_expired_record_loads_as_none() {
        for ttl in [1u64, 86_400] {
            let mgr = manager(ttl, true);
            let mut record = SessionRecord::new(ttl);
            record.expires_at = now_secs().saturating_sub(5);
            mgr.store()
                .save("sid-exp", &record, WriteGuard::IfAbsent)
                .await
                .unwrap();

            assert!(mgr.load("sid-exp").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_inclusive() {
        let mgr = manager(60, true);
        let mut record = SessionRecord::new(60);
        record.expires_at = now_secs();
        mgr.store()
            .save("sid-edge", &record, WriteGuard::IfAbsent)
            .await
            .unwrap();

        assert!(mgr.load("sid-edge").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unexpired_record_loads() {
        let mgr = manager(3600, true);
        let (id, _) = mgr.create().await.unwrap();
        assert!(mgr.load(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let mgr = manager(3600, true);
        let (id, _) = mgr.create().await.unwrap();

        mgr.destroy(&id).await.unwrap();
        mgr.destroy(&id).await.unwrap();
        mgr.destroy("never-existed").await.unwrap();

        assert!(mgr.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_checked_detects_concurrent_update() {
        let mgr = manager(3600, true);
        let (id, mut record) = mgr.create().await.unwrap();

        // Another request bumps the version.
        let mut other = record.clone();
        let new_version = mgr.save(&id, &mut other, 1).await.unwrap();
        assert_eq!(new_version, 2);

        let err = mgr.save_checked(&id, 1, &mut record).await.unwrap_err();
        assert_eq!(err, SessionError::VersionConflict);
    }

    #[tokio::test]
    async fn test_save_checked_succeeds_on_current_version() {
        let mgr = manager(3600, true);
        let (id, mut record) = mgr.create().await.unwrap();

        record.phase = AuthPhase::Authenticated {
            claims: serde_json::Map::new(),
            authenticated_at: now_secs(),
        };
        let v = mgr.save_checked(&id, 1, &mut record).await.unwrap();
        assert_eq!(v, 2);
    }

    #[tokio::test]
    async fn test_persist_new_regenerates_on_collision() {
        let mgr = manager(3600, true);
        let record = SessionRecord::new(3600);
        mgr.store()
            .save("taken", &record, WriteGuard::IfAbsent)
            .await
            .unwrap();

        let id = mgr.persist_new("taken".into(), &record).await.unwrap();
        assert_ne!(id, "taken");
        assert!(mgr.load(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sliding_expiry_extends_window() {
        let mgr = manager(100, true);
        let mut record = SessionRecord::new(100);
        record.created_at = now_secs() - 50;
        record.expires_at = record.created_at + 100;

        let before = record.expires_at;
        mgr.save("sid-slide", &mut record, 0).await.unwrap();
        assert!(record.expires_at > before);
        assert!(record.expires_at >= now_secs() + 100);
    }

    #[tokio::test]
    async fn test_fixed_expiry_keeps_window() {
        let mgr = manager(100, false);
        let mut record = SessionRecord::new(100);
        record.created_at = now_secs() - 50;
        record.expires_at = record.created_at + 100;

        mgr.save("sid-fixed", &mut record, 0).await.unwrap();
        assert_eq!(record.expires_at, record.created_at + 100);
    }

    #[tokio::test]
    async fn test_expiry_never_regresses() {
        let mgr = manager(100, true);
        let mut record = SessionRecord::new(100);
        record.expires_at = now_secs() + 1_000_000;

        let far = record.expires_at;
        mgr.save("sid-mono", &mut record, 0).await.unwrap();
        assert_eq!(record.expires_at, far);
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_as_backend_unavailable() {
        let store = Arc::new(InMemoryStore::new());
        let mgr = SessionManager::new(store.clone(), 3600, true);
        let (id, mut record) = mgr.create().await.unwrap();

        store.set_unavailable(true);
        assert_eq!(
            mgr.load(&id).await.unwrap_err(),
            SessionError::BackendUnavailable
        );
        assert_eq!(
            mgr.save(&id, &mut record, 1).await.unwrap_err(),
            SessionError::BackendUnavailable
        );
        assert_eq!(
            mgr.destroy(&id).await.unwrap_err(),
            SessionError::BackendUnavailable
        );
        assert_eq!(
            mgr.create().await.unwrap_err(),
            SessionError::BackendUnavailable
        );
    }

    #[test]
    fn test_random_token_length_and_uniqueness() {
        let a = random_token();
        let b = random_token();
        // 32 bytes base64url without padding
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }

    #[test]
    fn test_phase_serde_round_trip() {
        let pending = AuthPhase::Pending {
            state: "s1".into(),
            verifier: "v1".into(),
            redirect: "/dash".into(),
            issued_at: 1234,
        };
        let json = serde_json::to_value(&pending).unwrap();
        assert_eq!(json["phase"], "pending");
        assert_eq!(json["state"], "s1");

        let back: AuthPhase = serde_json::from_value(json).unwrap();
        assert_eq!(back, pending);
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(AuthPhase::Anonymous.name(), "anonymous");
        assert_eq!(
            AuthPhase::Authenticated {
                claims: serde_json::Map::new(),
                authenticated_at: 0
            }
            .name(),
            "authenticated"
        );
    }
}
