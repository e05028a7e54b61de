//! Change debouncer
//!
//! Settings editors can fire several change notifications for one logical
//! edit. The debouncer collapses such a burst into a single accepted event
//! per key.
//!
//! The check and the record update happen under one lock, so two events
//! delivered concurrently for the same key can never both pass the gate.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::traits::SettingKey;

/// Per-key gate over change notifications
///
/// Records are created lazily on the first event for a key and live as long
/// as the debouncer.
#[derive(Debug)]
pub struct ChangeDebouncer<K = SettingKey> {
    last_accepted: Mutex<HashMap<K, Instant>>,
}

impl<K: Eq + Hash> ChangeDebouncer<K> {
    /// Create a debouncer with no records
    pub fn new() -> Self {
        Self {
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    /// Accept an event for `key` if at least `min_interval` has passed since
    /// the last accepted event for that key
    ///
    /// On acceptance "now" becomes the key's last-accepted time; rejected
    /// events leave the record untouched.
    pub fn accept(&self, key: K, min_interval: Duration) -> bool {
        self.accept_at(key, min_interval, Instant::now())
    }

    /// [`accept`](Self::accept) with an explicit clock reading
    pub fn accept_at(&self, key: K, min_interval: Duration, now: Instant) -> bool {
        let mut records = self
            .last_accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(last) = records.get(&key) {
            if now.saturating_duration_since(*last) < min_interval {
                return false;
            }
        }

        records.insert(key, now);
        true
    }

    /// Number of keys seen so far
    pub fn len(&self) -> usize {
        self.last_accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash> Default for ChangeDebouncer<K> {
    fn default() -> Self {
        Self::new()
    }
}
