//! In-flight operation registry.
//!
//! Tracks which keys currently have an operation running, so a second
//! operation for the same key can be rejected instead of interleaving.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Keys {
    busy: HashSet<String>,
    /// Number of operations ever started per key.
    started: HashMap<String, u64>,
}

/// Set of keys with an operation in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    keys: Arc<Mutex<Keys>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as busy. Returns `None` if it already is.
    ///
    /// The key is released when the returned guard is dropped.
    pub fn try_begin(&self, key: impl Into<String>) -> Option<InFlightGuard> {
        let key = key.into();
        let mut keys = lock(&self.keys);
        if !keys.busy.insert(key.clone()) {
            return None;
        }
        *keys.started.entry(key.clone()).or_default() += 1;
        Some(InFlightGuard {
            keys: Arc::clone(&self.keys),
            key,
        })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.keys).busy.contains(key)
    }

    /// Changes whenever an operation on `key` starts.
    pub fn generation(&self, key: &str) -> u64 {
        lock(&self.keys).started.get(key).copied().unwrap_or_default()
    }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<Keys>>,
    key: String,
}

impl InFlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.keys).busy.remove(&self.key);
    }
}

// The set stays consistent even if a holder panicked.
fn lock(keys: &Mutex<Keys>) -> MutexGuard<'_, Keys> {
    keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
