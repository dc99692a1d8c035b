//! # Shared Session Cache
//!
//! Refcounted cache for cloud-SDK sessions shared across scalers that reuse
//! the same identity. Entries are keyed by the trigger-unique key; `acquire`
//! either clones the live session or runs the initializer, `release` drops
//! one reference and tears the session down on the last one. Explicit
//! acquire/release keeps the sharing visible instead of hiding it in global
//! state.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::Mutex;
use tracing::debug;

use crate::scaler::error::ScalerError;

struct Entry<T> {
    value: T,
    refs: usize,
}

/// Refcounted async cache of shared sessions
pub struct SessionCache<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T> std::fmt::Debug for SessionCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").finish_non_exhaustive()
    }
}

impl<T> Default for SessionCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SessionCache<T> {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send> SessionCache<T> {
    /// Clone the cached session for `key`, or initialize one. Concurrent
    /// acquires of the same key serialize on the cache lock, so the
    /// initializer runs at most once per live entry.
    ///
    /// # Errors
    ///
    /// Propagates the initializer's error; the entry is not created.
    pub async fn acquire<F, Fut>(&self, key: &str, init: F) -> Result<T, ScalerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ScalerError>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.refs += 1;
            debug!(key, refs = entry.refs, "reusing shared session");
            return Ok(entry.value.clone());
        }

        let value = init().await?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                refs: 1,
            },
        );
        debug!(key, "initialized shared session");
        Ok(value)
    }

    /// Drop one reference; the last reference removes the session.
    /// Returns true when the session was torn down.
    pub async fn release(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            entries.remove(key);
            debug!(key, "released last reference, session dropped");
            return true;
        }
        debug!(key, refs = entry.refs, "released shared session reference");
        false
    }

    /// Live reference count for `key`; 0 when absent
    pub async fn ref_count(&self, key: &str) -> usize {
        self.entries
            .lock()
            .await
            .get(key)
            .map_or(0, |entry| entry.refs)
    }
}
