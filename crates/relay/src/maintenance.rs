//! Periodic eviction of expired dedup entries and history records.

use std::sync::Arc;
use std::time::Duration;

use pipeline::Clock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, Instrument};

use crate::dedup::DedupStore;
use crate::history::HistoryLog;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub dedup_removed: usize,
    pub history_removed: usize,
}

/// Evicts expired state from the dedup index and the history log.
pub struct Sweeper {
    dedup: Arc<DedupStore>,
    history: Arc<HistoryLog>,
    clock: Arc<dyn Clock>,
    dedup_ttl: Duration,
    history_ttl: Duration,
}

impl Sweeper {
    pub fn new(
        dedup: Arc<DedupStore>,
        history: Arc<HistoryLog>,
        clock: Arc<dyn Clock>,
        dedup_ttl: Duration,
        history_ttl: Duration,
    ) -> Self {
        Self {
            dedup,
            history,
            clock,
            dedup_ttl,
            history_ttl,
        }
    }

    /// Runs one sweep at the clock's current time.
    pub async fn run_once(&self) -> SweepReport {
        let now = self.clock.now();
        let report = SweepReport {
            dedup_removed: self.dedup.evict_expired(now, self.dedup_ttl).await,
            history_removed: self.history.evict_expired(now, self.history_ttl).await,
        };
        info!(
            dedup_removed = report.dedup_removed,
            history_removed = report.history_removed,
            "Maintenance sweep finished"
        );
        report
    }

    /// Sweeps every `every`, starting one period from now. Abort the handle to stop.
    pub fn spawn(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The first tick completes immediately.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    self.run_once().await;
                }
            }
            .instrument(tracing::info_span!("maintenance")),
        )
    }
}

#[cfg(test)]
mod tests {
    use pipeline::{
        DedupKey, EventType, HistoryRecord, HistoryScope, RepositoryName, TargetId,
    };
    use serde_json::json;
    use storage::MemoryStore;

    use super::*;
    use crate::testing::ManualClock;

    #[tokio::test]
    async fn sweep_applies_each_ttl() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new());
        let dedup = Arc::new(DedupStore::new(store.clone(), Duration::from_secs(60)));
        let history = Arc::new(HistoryLog::new(store, 10));
        let sweeper = Sweeper::new(
            dedup.clone(),
            history.clone(),
            clock.clone(),
            Duration::from_secs(60),
            Duration::from_secs(600),
        );

        let scope = HistoryScope {
            target_id: TargetId::new("team").unwrap(),
            repository: RepositoryName::parse("octo/hello").unwrap(),
        };
        dedup.mark_seen(&DedupKey::new("k").unwrap(), clock.now()).await;
        history
            .append(
                &scope,
                HistoryRecord {
                    event_type: EventType::new("push").unwrap(),
                    timestamp: clock.now(),
                    data: json!({}),
                },
            )
            .await;

        clock.advance(Duration::from_secs(120));
        assert_eq!(
            sweeper.run_once().await,
            SweepReport {
                dedup_removed: 1,
                history_removed: 0
            }
        );

        clock.advance(Duration::from_secs(600));
        assert_eq!(sweeper.run_once().await.history_removed, 1);
        assert!(dedup.is_empty());
        assert_eq!(history.len(&scope), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_sweeps_on_schedule() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new());
        let dedup = Arc::new(DedupStore::new(store.clone(), Duration::from_secs(60)));
        let sweeper = Arc::new(Sweeper::new(
            dedup.clone(),
            Arc::new(HistoryLog::new(store, 10)),
            clock.clone(),
            Duration::from_secs(60),
            Duration::from_secs(600),
        ));

        dedup.mark_seen(&DedupKey::new("k").unwrap(), clock.now()).await;
        clock.advance(Duration::from_secs(120));

        let handle = sweeper.spawn(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(dedup.is_empty());
        handle.abort();
    }
}
