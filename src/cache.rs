use std::sync::Arc;

use dashmap::DashMap;

use crate::digest::AuthState;

/// Per-host [`AuthState`] cache, at most one entry per host.
///
/// Owned by a [`Requestor`](crate::Requestor); clones share the same entries,
/// so one cache can back several requestors. Entries have no timers of their
/// own, staleness is only noticed on next use.
#[derive(Debug, Clone, Default)]
pub struct AuthStateCache {
    entries: Arc<DashMap<String, Arc<AuthState>>>,
}

impl AuthStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host: &str) -> Option<Arc<AuthState>> {
        self.entries.get(host).map(|e| Arc::clone(e.value()))
    }

    /// Store `state` for `host`, replacing any previous entry
    pub fn insert(&self, host: &str, state: Arc<AuthState>) {
        self.entries.insert(host.to_owned(), state);
    }

    pub fn remove(&self, host: &str) -> Option<Arc<AuthState>> {
        self.entries.remove(host).map(|(_, state)| state)
    }

    /// Remove the entry for `host` only if it is still `state`. A newer state
    /// stored meanwhile by a concurrent request is kept.
    pub fn remove_stale(&self, host: &str, state: &Arc<AuthState>) -> bool {
        self.entries
            .remove_if(host, |_, current| Arc::ptr_eq(current, state))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
