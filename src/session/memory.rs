//! In-memory session store for development and testing.
//!
//! Not shared across worker processes; sessions vanish on restart. Keeps
//! expired entries until the manager notices them, which is exactly what
//! the expiry tests need. A fault switch lets tests simulate an outage.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{SessionRecord, SessionStore, StoreError, WriteGuard};

pub struct InMemoryStore {
    entries: DashMap<String, (SessionRecord, u64)>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail, simulating a store outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemoryStore {
    async fn load(&self, session_id: &str) -> Result<Option<(SessionRecord, u64)>, StoreError> {
        self.check_available()?;
        Ok(self.entries.get(session_id).map(|e| e.value().clone()))
    }

    async fn save(
        &self,
        session_id: &str,
        record: &SessionRecord,
        guard: WriteGuard,
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        // The entry API holds the shard lock, so each arm is atomic.
        match guard {
            WriteGuard::Overwrite(version) => {
                self.entries
                    .insert(session_id.to_string(), (record.clone(), version));
                Ok(version)
            }
            WriteGuard::IfAbsent => match self.entries.entry(session_id.to_string()) {
                Entry::Occupied(_) => Err(StoreError::VersionConflict),
                Entry::Vacant(slot) => {
                    slot.insert((record.clone(), 1));
                    Ok(1)
                }
            },
            WriteGuard::IfVersion(expected) => match self.entries.entry(session_id.to_string()) {
                Entry::Occupied(mut slot) if slot.get().1 == expected => {
                    let version = expected + 1;
                    slot.insert((record.clone(), version));
                    Ok(version)
                }
                _ => Err(StoreError::VersionConflict),
            },
        }
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries.remove(session_id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
