//! Rate-limited failure notifications.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pipeline::{KeyValueStore, MessageSender, OutboundMessage, RouteConfig, RouteKey, Timestamp};
use tracing::{debug, info, warn};

use crate::persist;
use crate::settings::whole_seconds;

/// Tells a route's target that processing failed, at most once per window.
///
/// `last_sent` holds one slot per route key seen in this process. A slot is
/// filled from storage the first time its key is seen, so the window carries
/// over a restart. Timestamps are written back under a write gate, reading
/// the slot inside the gate, so a slower write never replaces a newer time.
pub struct ErrorNotifier {
    store: Arc<dyn KeyValueStore>,
    sender: Arc<dyn MessageSender>,
    window: Duration,
    last_sent: Mutex<HashMap<RouteKey, Option<Timestamp>>>,
    write_gate: tokio::sync::Mutex<()>,
}

impl ErrorNotifier {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        sender: Arc<dyn MessageSender>,
        window: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            window,
            last_sent: Mutex::new(HashMap::new()),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Sends a failure notice for `route` unless one went out within the window.
    ///
    /// Returns `true` if a notice was attempted. Send failures are logged.
    pub async fn notify(&self, route: &RouteConfig, summary: &str, now: Timestamp) -> bool {
        let key = route.route_key();

        let known = self.last_sent.lock().contains_key(&key);
        if !known {
            let persisted = self.load_last_sent(&key).await;
            self.last_sent.lock().entry(key.clone()).or_insert(persisted);
        }

        let due = {
            let mut last_sent = self.last_sent.lock();
            let slot = last_sent.entry(key.clone()).or_insert(None);
            match *slot {
                Some(previous) if now.seconds_since(previous) < whole_seconds(self.window) => false,
                _ => {
                    *slot = Some(now);
                    true
                }
            }
        };
        if !due {
            debug!(route_key = %key, "Failure notice suppressed by rate limit");
            return false;
        }

        self.persist_last_sent(&key).await;

        let message = OutboundMessage::for_route(route, failure_text(route, summary));
        match self.sender.send(&message).await {
            Ok(()) => info!(route_key = %key, "Failure notice sent"),
            Err(e) => warn!(route_key = %key, error = %e, "Failed to send failure notice"),
        }
        true
    }

    async fn persist_last_sent(&self, key: &RouteKey) {
        let _gate = self.write_gate.lock().await;

        let Some(at) = self.last_sent.lock().get(key).copied().flatten() else {
            return;
        };
        if let Err(e) =
            persist::save(self.store.as_ref(), &persist::error_ratelimit_key(key), &at).await
        {
            warn!(route_key = %key, error = %e, "Failed to persist notification time");
        }
    }

    async fn load_last_sent(&self, key: &RouteKey) -> Option<Timestamp> {
        match persist::load(self.store.as_ref(), &persist::error_ratelimit_key(key)).await {
            Ok(at) => at,
            Err(e) => {
                warn!(route_key = %key, error = %e, "Failed to read notification time");
                None
            }
        }
    }
}

fn failure_text(route: &RouteConfig, summary: &str) -> String {
    format!(
        "Warning: GitHub webhook processing failed\n\n\
         Repository: {}\n\
         Error: {summary}\n\n\
         Check the configuration or contact an administrator",
        route.repository
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pipeline::{EventType, PlatformName, RepositoryName, RouteId, TargetId, TargetType};
    use storage::MemoryStore;

    use super::*;
    use crate::testing::RecordingSender;

    fn route(id: &str) -> RouteConfig {
        RouteConfig {
            id: RouteId::new(id).unwrap(),
            target_id: TargetId::new("team").unwrap(),
            target_type: TargetType::Group,
            platform: PlatformName::new("telegram").unwrap(),
            repository: RepositoryName::parse("octo/hello").unwrap(),
            subscribed_events: BTreeSet::from([EventType::new("push").unwrap()]),
            secret: None,
            enabled: true,
            created_at: at(0),
        }
    }

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_unix_seconds(secs).unwrap()
    }

    fn notifier(store: Arc<MemoryStore>, sender: Arc<RecordingSender>) -> ErrorNotifier {
        ErrorNotifier::new(store, sender, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn sends_at_most_once_per_window() {
        let sender = Arc::new(RecordingSender::new());
        let n = notifier(Arc::new(MemoryStore::new()), sender.clone());
        let r = route("aaaa1111");

        assert!(n.notify(&r, "boom", at(1_000)).await);
        assert!(!n.notify(&r, "boom again", at(1_299)).await);
        assert_eq!(sender.sent().len(), 1);

        assert!(n.notify(&r, "still broken", at(1_300)).await);
        assert_eq!(sender.sent().len(), 2);
    }

    #[tokio::test]
    async fn windows_are_per_route() {
        let sender = Arc::new(RecordingSender::new());
        let n = notifier(Arc::new(MemoryStore::new()), sender.clone());

        assert!(n.notify(&route("aaaa1111"), "x", at(1_000)).await);
        assert!(n.notify(&route("bbbb2222"), "x", at(1_001)).await);
        assert_eq!(sender.sent().len(), 2);
    }

    #[tokio::test]
    async fn message_names_repository_and_error() {
        let sender = Arc::new(RecordingSender::new());
        let n = notifier(Arc::new(MemoryStore::new()), sender.clone());

        n.notify(&route("aaaa1111"), "Forwarding failed: timeout", at(1_000))
            .await;

        let sent = sender.sent();
        assert_eq!(sent[0].target_id.as_str(), "team");
        assert!(sent[0].text.contains("Repository: octo/hello"));
        assert!(sent[0].text.contains("Error: Forwarding failed: timeout"));
    }

    #[tokio::test]
    async fn window_survives_restart() {
        let backing = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let r = route("aaaa1111");

        notifier(backing.clone(), sender.clone())
            .notify(&r, "x", at(1_000))
            .await;

        let restarted = notifier(backing, sender.clone());
        assert!(!restarted.notify(&r, "x", at(1_100)).await);
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn send_failure_still_consumes_the_window() {
        let sender = Arc::new(RecordingSender::new());
        sender.fail_next(1);
        let n = notifier(Arc::new(MemoryStore::new()), sender.clone());
        let r = route("aaaa1111");

        assert!(n.notify(&r, "x", at(1_000)).await);
        assert!(!n.notify(&r, "x", at(1_010)).await);
        assert_eq!(sender.attempts(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_for_one_route_send_once() {
        let backing = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let n = Arc::new(notifier(backing.clone(), sender.clone()));
        let r = route("aaaa1111");

        let mut tasks = Vec::new();
        for i in 0..32 {
            let n = n.clone();
            let r = r.clone();
            tasks.push(tokio::spawn(async move {
                n.notify(&r, "boom", at(1_000 + i % 3)).await
            }));
        }
        let mut attempted = 0;
        for t in tasks {
            if t.await.unwrap() {
                attempted += 1;
            }
        }

        assert_eq!(attempted, 1);
        assert_eq!(sender.sent().len(), 1);
        let stored = backing
            .get(&persist::error_ratelimit_key(&r.route_key()))
            .await
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn stored_time_is_the_latest_notification() {
        let backing = Arc::new(MemoryStore::new());
        let n = notifier(backing.clone(), Arc::new(RecordingSender::new()));
        let r = route("aaaa1111");

        n.notify(&r, "x", at(1_000)).await;
        n.notify(&r, "x", at(1_400)).await;

        let stored: Option<Timestamp> =
            persist::load(backing.as_ref(), &persist::error_ratelimit_key(&r.route_key()))
                .await
                .unwrap();
        assert_eq!(stored, Some(at(1_400)));
    }
}
