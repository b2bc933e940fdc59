//! Time-windowed record of processed event keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pipeline::{DedupKey, KeyValueStore, Timestamp};
use tracing::{debug, info, warn};

use crate::persist;
use crate::settings::whole_seconds;

/// Tracks which dedup keys were processed within the TTL window.
///
/// The in-memory index is authoritative while the process runs and is
/// written back to the key-value store after every change. Check-and-mark
/// ([`Self::claim`]) and eviction run under the same lock, so concurrent
/// deliveries with the same key let exactly one through and a sweep never
/// removes an entry a check is reading.
pub struct DedupStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    seen: Mutex<HashMap<DedupKey, Timestamp>>,
    write_gate: tokio::sync::Mutex<()>,
}

impl DedupStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            seen: Mutex::new(HashMap::new()),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Loads persisted entries, keeping the newer timestamp where a key is
    /// already known. Returns the number of entries loaded.
    ///
    /// An index that cannot be read or decoded is logged and ignored; the
    /// store then starts empty and the next change overwrites it.
    pub async fn load(&self) -> usize {
        let persisted: HashMap<DedupKey, Timestamp> =
            match persist::load(self.store.as_ref(), persist::DEDUP_KEY).await {
                Ok(persisted) => persisted.unwrap_or_default(),
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable dedup index");
                    HashMap::new()
                }
            };
        let count = persisted.len();

        let mut seen = self.seen.lock();
        for (key, at) in persisted {
            seen.entry(key)
                .and_modify(|existing| *existing = (*existing).max(at))
                .or_insert(at);
        }
        drop(seen);

        info!(entries = count, "Dedup index loaded");
        count
    }

    /// Returns `true` if `key` was marked within the TTL window ending at `now`.
    pub fn has_seen(&self, key: &DedupKey, now: Timestamp) -> bool {
        let seen = self.seen.lock();
        seen.get(key).is_some_and(|at| self.is_live(*at, now))
    }

    /// Marks `key` as processed at `now`.
    ///
    /// Idempotent: marking a key that is still inside its window keeps the
    /// original timestamp.
    pub async fn mark_seen(&self, key: &DedupKey, now: Timestamp) {
        let changed = self.try_mark(key, now);
        if changed {
            self.persist().await;
        }
    }

    /// Atomically checks and marks `key`.
    ///
    /// Returns `true` if the caller is the first to see `key` within the
    /// window (and should process the delivery), `false` if it is a repeat.
    pub async fn claim(&self, key: &DedupKey, now: Timestamp) -> bool {
        let claimed = self.try_mark(key, now);
        if claimed {
            self.persist().await;
        } else {
            debug!(key = %key, "Dedup key already claimed");
        }
        claimed
    }

    /// Removes entries older than `ttl` at `now`. Returns how many were removed.
    pub async fn evict_expired(&self, now: Timestamp, ttl: Duration) -> usize {
        let max_age = whole_seconds(ttl);
        let removed = {
            let mut seen = self.seen.lock();
            let before = seen.len();
            seen.retain(|_, at| now.seconds_since(*at) <= max_age);
            before - seen.len()
        };

        if removed > 0 {
            self.persist().await;
        }
        debug!(removed, "Expired dedup entries evicted");
        removed
    }

    /// Number of entries currently held (including expired, unswept ones).
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    fn is_live(&self, at: Timestamp, now: Timestamp) -> bool {
        now.seconds_since(at) <= whole_seconds(self.ttl)
    }

    /// Inserts `key` unless a live entry exists. Returns whether it inserted.
    fn try_mark(&self, key: &DedupKey, now: Timestamp) -> bool {
        let mut seen = self.seen.lock();
        match seen.get(key) {
            Some(at) if self.is_live(*at, now) => false,
            _ => {
                seen.insert(key.clone(), now);
                true
            }
        }
    }

    async fn persist(&self) {
        let _gate = self.write_gate.lock().await;
        let snapshot = self.seen.lock().clone();
        if let Err(e) = persist::save(self.store.as_ref(), persist::DEDUP_KEY, &snapshot).await {
            warn!(error = %e, "Failed to persist dedup index");
        }
    }
}
