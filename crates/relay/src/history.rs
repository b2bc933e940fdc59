//! Bounded per-scope history of received deliveries.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pipeline::{
    HistoryRecord, HistoryScope, KeyValueStore, RepositoryName, TargetId, Timestamp,
};
use tracing::{debug, info, warn};

use crate::persist;
use crate::settings::whole_seconds;

/// Per-target layout in storage: repository → records, oldest first.
type TargetHistory = BTreeMap<RepositoryName, Vec<HistoryRecord>>;

/// Recent deliveries per (target, repository), capped at `max_records` each.
///
/// Appending and trimming a scope happen under one lock, so concurrent
/// appends never push a scope past the cap. Each target's history is
/// persisted under its own key after every change.
pub struct HistoryLog {
    store: Arc<dyn KeyValueStore>,
    max_records: usize,
    scopes: Mutex<HashMap<HistoryScope, VecDeque<HistoryRecord>>>,
    write_gate: tokio::sync::Mutex<()>,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn KeyValueStore>, max_records: usize) -> Self {
        Self {
            store,
            max_records: max_records.max(1),
            scopes: Mutex::new(HashMap::new()),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Loads persisted history for `targets`. Returns the number of records loaded.
    ///
    /// A target whose history cannot be read or decoded is logged and skipped.
    pub async fn load(&self, targets: impl IntoIterator<Item = TargetId>) -> usize {
        let mut loaded = 0;
        let unique: HashSet<TargetId> = targets.into_iter().collect();

        for target in unique {
            let key = persist::history_key(&target);
            let persisted =
                match persist::load::<TargetHistory>(self.store.as_ref(), &key).await {
                    Ok(Some(persisted)) => persisted,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(target_id = %target, error = %e, "Skipping unreadable history");
                        continue;
                    }
                };

            let mut scopes = self.scopes.lock();
            for (repository, records) in persisted {
                let skip = records.len().saturating_sub(self.max_records);
                let records: VecDeque<_> = records.into_iter().skip(skip).collect();
                loaded += records.len();
                scopes.insert(
                    HistoryScope {
                        target_id: target.clone(),
                        repository,
                    },
                    records,
                );
            }
        }

        info!(records = loaded, "History loaded");
        loaded
    }

    /// Appends `record` to `scope`, dropping the oldest records beyond the cap.
    pub async fn append(&self, scope: &HistoryScope, record: HistoryRecord) {
        {
            let mut scopes = self.scopes.lock();
            let records = scopes.entry(scope.clone()).or_default();
            records.push_back(record);
            while records.len() > self.max_records {
                records.pop_front();
            }
        }
        self.persist_target(&scope.target_id).await;
    }

    /// Up to `n` most recent records for `scope`, newest first.
    pub fn recent(&self, scope: &HistoryScope, n: usize) -> Vec<HistoryRecord> {
        let scopes = self.scopes.lock();
        scopes
            .get(scope)
            .map(|records| records.iter().rev().take(n).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records held for `scope`.
    pub fn len(&self, scope: &HistoryScope) -> usize {
        self.scopes.lock().get(scope).map_or(0, VecDeque::len)
    }

    /// Drops records older than `ttl` at `now`; empty scopes are removed.
    /// Returns how many records were dropped.
    pub async fn evict_expired(&self, now: Timestamp, ttl: Duration) -> usize {
        let max_age = whole_seconds(ttl);
        let mut touched = HashSet::new();
        let mut removed = 0;
        {
            let mut scopes = self.scopes.lock();
            scopes.retain(|scope, records| {
                let before = records.len();
                records.retain(|r| now.seconds_since(r.timestamp) <= max_age);
                if records.len() != before {
                    removed += before - records.len();
                    touched.insert(scope.target_id.clone());
                }
                !records.is_empty()
            });
        }

        for target in &touched {
            self.persist_target(target).await;
        }
        debug!(removed, "Expired history records evicted");
        removed
    }

    /// Drops all history for `scope`.
    pub async fn forget(&self, scope: &HistoryScope) {
        let removed = self.scopes.lock().remove(scope).is_some();
        if removed {
            self.persist_target(&scope.target_id).await;
        }
    }

    async fn persist_target(&self, target: &TargetId) {
        let _gate = self.write_gate.lock().await;

        let snapshot: TargetHistory = {
            let scopes = self.scopes.lock();
            scopes
                .iter()
                .filter(|(scope, _)| &scope.target_id == target)
                .map(|(scope, records)| {
                    (scope.repository.clone(), records.iter().cloned().collect())
                })
                .collect()
        };

        let key = persist::history_key(target);
        let result = if snapshot.is_empty() {
            self.store.delete(&key).await
        } else {
            persist::save(self.store.as_ref(), &key, &snapshot).await
        };
        if let Err(e) = result {
            warn!(target_id = %target, error = %e, "Failed to persist history");
        }
    }
}
