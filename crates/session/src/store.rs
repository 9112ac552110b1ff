//! Session store: keeps a per-origin identity record (site, session id, user id,
//! last variant). The client sends the stored session id with each site fetch,
//! so stickiness across loads is up to the server honouring it.
//! Read-modify-write of one origin is serialized.

use crate::backend::{MemoryBackend, SessionBackend};
use bandit_core::{SessionDescriptor, SessionPatch};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared by every client of the same process; hand it out as `Arc<SessionStore>`.
pub struct SessionStore {
    backend: Option<Arc<dyn SessionBackend>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            backend: Some(backend),
            locks: DashMap::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Store without durable storage: upserts echo the patch and persist nothing.
    pub fn transient() -> Self {
        Self {
            backend: None,
            locks: DashMap::new(),
        }
    }

    pub fn is_durable(&self) -> bool {
        self.backend.is_some()
    }

    /// Merge `patch` over the stored descriptor for its origin, persist and return it.
    ///
    /// Unreadable or corrupt records are treated as absent, and write failures
    /// are logged; neither reaches the caller.
    ///
    /// Backend I/O runs on the calling thread. [`FileBackend`](crate::FileBackend)
    /// records are a few hundred bytes, so this blocks an async caller only briefly.
    pub fn upsert(&self, patch: &SessionPatch) -> SessionDescriptor {
        let origin = patch.origin().to_string();
        let Some(backend) = &self.backend else {
            return SessionDescriptor::new(origin).apply(patch);
        };

        let lock = self.locks.entry(origin.clone()).or_default().clone();
        let session = {
            let _guard = lock.lock();
            Self::merge(backend.as_ref(), &origin, patch)
        };
        // Only the map and this call hold the lock: nobody is waiting on it.
        self.locks.remove_if(&origin, |_, l| Arc::strong_count(l) <= 2);

        debug!(origin = %origin, variant = %session.variant, "Session upserted");
        session
    }

    fn merge(
        backend: &dyn SessionBackend,
        origin: &str,
        patch: &SessionPatch,
    ) -> SessionDescriptor {
        let session = Self::read(backend, origin)
            .unwrap_or_else(|| SessionDescriptor::new(origin))
            .apply(patch);

        match serde_json::to_string(&session) {
            Ok(record) => {
                if let Err(e) = backend.write(origin, &record) {
                    metrics::counter!("bandit.session.storage_errors").increment(1);
                    warn!(origin = %origin, error = %e, "Failed to persist session");
                }
            }
            Err(e) => warn!(origin = %origin, error = %e, "Failed to serialize session"),
        }
        session
    }

    /// Current descriptor for `origin`, if one is stored and readable.
    pub fn get(&self, origin: &str) -> Option<SessionDescriptor> {
        Self::read(self.backend.as_deref()?, origin)
    }

    fn read(backend: &dyn SessionBackend, origin: &str) -> Option<SessionDescriptor> {
        let record = match backend.read(origin) {
            Ok(record) => record?,
            Err(e) => {
                metrics::counter!("bandit.session.storage_errors").increment(1);
                warn!(origin = %origin, error = %e, "Failed to read session, starting fresh");
                return None;
            }
        };
        match serde_json::from_str(&record) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Discarding corrupt session record");
                None
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
