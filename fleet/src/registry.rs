//! Index of spot requests submitted this run that may not yet appear in
//! the cloud listing.
//!
//! The listing lags submission by a few seconds (occasionally forever,
//! when a request is rejected before it materializes), so the watcher
//! treats everything in here as pending. Entries leave on successful
//! setup, forced termination, or age-based garbage collection.
//!
//! Holders never do I/O under the lock; every accessor copies out.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use cloud::types::SpotRequest;

#[derive(Default)]
pub struct RequestRegistry {
    inner: Mutex<HashMap<String, SpotRequest>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request: SpotRequest) {
        self.inner.lock().insert(request.id.clone(), request);
    }

    pub fn remove(&self, request_id: &str) -> Option<SpotRequest> {
        self.inner.lock().remove(request_id)
    }

    pub fn snapshot(&self) -> Vec<SpotRequest> {
        self.inner.lock().values().cloned().collect()
    }

    /// Drop entries created before `cutoff`; returns what was dropped.
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Vec<SpotRequest> {
        let mut guard = self.inner.lock();
        let expired: Vec<String> = guard
            .values()
            .filter(|r| r.create_time < cutoff)
            .map(|r| r.id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| guard.remove(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
