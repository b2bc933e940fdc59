//! The per-delivery pipeline.
//!
//! ```text
//! Received → Verified → Parsed → Filtered → Deduplicated → Recorded → Dispatched
//!     │          │          │          │              │
//!     └ Rejected ┴──────────┘   Rejected     Suppressed     └→ Failed (notifier)
//! ```
//!
//! The pipeline never sees HTTP. The listener turns a request into a
//! [`Delivery`] and maps the returned [`Outcome`] to a response.

use std::sync::Arc;

use bytes::Bytes;
use pipeline::{
    derive_event_key, signature, Clock, DispatchError, EventType, FormatterRegistry,
    HistoryRecord, MessageSender, OutboundMessage, RouteConfig,
};
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::dedup::DedupStore;
use crate::history::HistoryLog;
use crate::notifier::ErrorNotifier;

/// One inbound webhook request, stripped of transport detail.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// `X-GitHub-Event`.
    pub event_type: String,
    /// `X-GitHub-Delivery`, used only for logging.
    pub delivery_id: Option<String>,
    /// `X-Hub-Signature-256`.
    pub signature: Option<String>,
    /// Raw request body.
    pub body: Bytes,
}

/// Why a delivery was turned away before it reached the dedup stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidSignature,
    InvalidPayload,
    UnsubscribedEvent,
}

/// How the pipeline finished with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Formatted and handed to the sender.
    Dispatched,
    /// Recorded in history; no formatter exists for the event type.
    Recorded,
    /// Turned away.
    Rejected(RejectReason),
    /// Already processed within the dedup window.
    Suppressed,
    /// Formatting or forwarding failed; the target was notified (rate limited).
    Failed,
}

/// Runs deliveries for live routes through verify, parse, filter, dedup,
/// record and dispatch.
pub struct WebhookPipeline {
    dedup: Arc<DedupStore>,
    history: Arc<HistoryLog>,
    notifier: Arc<ErrorNotifier>,
    formatters: Arc<FormatterRegistry>,
    sender: Arc<dyn MessageSender>,
    clock: Arc<dyn Clock>,
}

impl WebhookPipeline {
    pub fn new(
        dedup: Arc<DedupStore>,
        history: Arc<HistoryLog>,
        notifier: Arc<ErrorNotifier>,
        formatters: Arc<FormatterRegistry>,
        sender: Arc<dyn MessageSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dedup,
            history,
            notifier,
            formatters,
            sender,
            clock,
        }
    }

    /// Processes one delivery for `route`.
    pub async fn handle(&self, route: &RouteConfig, delivery: Delivery) -> Outcome {
        let span = info_span!(
            "webhook_delivery",
            route_key = %route.route_key(),
            repository = %route.repository,
            event_type = %delivery.event_type,
            delivery_id = delivery.delivery_id.as_deref().unwrap_or("-"),
        );
        self.process(route, delivery).instrument(span).await
    }

    async fn process(&self, route: &RouteConfig, delivery: Delivery) -> Outcome {
        if let Some(secret) = route.secret.as_deref().filter(|s| !s.is_empty()) {
            if !signature::verify(Some(secret), &delivery.body, delivery.signature.as_deref()) {
                warn!("Webhook signature verification failed");
                return Outcome::Rejected(RejectReason::InvalidSignature);
            }
        }

        let payload: Value = match serde_json::from_slice(&delivery.body) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Webhook body is not valid JSON");
                return Outcome::Rejected(RejectReason::InvalidPayload);
            }
        };

        let event_type = match EventType::new(delivery.event_type.trim()) {
            Some(event_type) if route.is_subscribed(&event_type) => event_type,
            _ => {
                debug!("Event type not subscribed; ignoring");
                return Outcome::Rejected(RejectReason::UnsubscribedEvent);
            }
        };

        let now = self.clock.now();
        if let Some(key) = derive_event_key(&route.repository, &event_type, &payload) {
            if !self.dedup.claim(&key, now).await {
                info!(dedup_key = %key, "Duplicate delivery suppressed");
                return Outcome::Suppressed;
            }
        }

        self.history
            .append(
                &route.history_scope(),
                HistoryRecord {
                    event_type: event_type.clone(),
                    timestamp: now,
                    data: payload.clone(),
                },
            )
            .await;

        let Some(formatter) = self.formatters.get(&event_type) else {
            warn!("No formatter for event type; delivery recorded only");
            return Outcome::Recorded;
        };

        let result: Result<(), DispatchError> = async {
            let text = formatter.format(&payload)?;
            self.sender
                .send(&OutboundMessage::for_route(route, text))
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                info!("Notification forwarded");
                Outcome::Dispatched
            }
            Err(e) => {
                error!(error = %e, "Webhook dispatch failed");
                self.notifier
                    .notify(route, &e.to_string(), self.clock.now())
                    .await;
                Outcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use pipeline::{
        EventFormatter, FormatError, PlatformName, RepositoryName, RouteId, TargetId, TargetType,
        Timestamp,
    };
    use serde_json::json;
    use storage::MemoryStore;

    use super::*;
    use crate::testing::{ManualClock, RecordingSender};

    struct Summary;

    impl EventFormatter for Summary {
        fn format(&self, payload: &Value) -> Result<String, FormatError> {
            Ok(format!("event: {}", payload["action"].as_str().unwrap_or("push")))
        }
    }

    struct Broken;

    impl EventFormatter for Broken {
        fn format(&self, _payload: &Value) -> Result<String, FormatError> {
            Err(FormatError::MissingField {
                event_type: "push".to_string(),
                field: "head_commit".to_string(),
            })
        }
    }

    struct Harness {
        pipeline: WebhookPipeline,
        sender: Arc<RecordingSender>,
        history: Arc<HistoryLog>,
        clock: Arc<ManualClock>,
    }

    fn harness(formatters: FormatterRegistry) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let clock = Arc::new(ManualClock::new());
        let dedup = Arc::new(DedupStore::new(store.clone(), Duration::from_secs(3600)));
        let history = Arc::new(HistoryLog::new(store.clone(), 100));
        let notifier = Arc::new(ErrorNotifier::new(
            store,
            sender.clone(),
            Duration::from_secs(300),
        ));
        let pipeline = WebhookPipeline::new(
            dedup,
            history.clone(),
            notifier,
            Arc::new(formatters),
            sender.clone(),
            clock.clone(),
        );
        Harness {
            pipeline,
            sender,
            history,
            clock,
        }
    }

    fn summaries() -> FormatterRegistry {
        FormatterRegistry::new()
            .with(EventType::new("push").unwrap(), Arc::new(Summary))
            .with(EventType::new("issues").unwrap(), Arc::new(Summary))
    }

    fn route(secret: Option<&str>) -> RouteConfig {
        RouteConfig {
            id: RouteId::new("1a2b3c4d").unwrap(),
            target_id: TargetId::new("team").unwrap(),
            target_type: TargetType::Group,
            platform: PlatformName::new("telegram").unwrap(),
            repository: RepositoryName::parse("octo/hello").unwrap(),
            subscribed_events: BTreeSet::from([
                EventType::new("push").unwrap(),
                EventType::new("issues").unwrap(),
            ]),
            secret: secret.map(str::to_string),
            enabled: true,
            created_at: Timestamp::from_unix_seconds(0).unwrap(),
        }
    }

    fn delivery(event: &str, body: Value, signature: Option<String>) -> Delivery {
        Delivery {
            event_type: event.to_string(),
            delivery_id: Some("d-1".to_string()),
            signature,
            body: Bytes::from(body.to_string()),
        }
    }

    #[tokio::test]
    async fn push_redelivery_is_suppressed() {
        let h = harness(summaries());
        let r = route(None);
        let body = json!({ "head_commit": { "id": "abc123" } });

        let first = h.pipeline.handle(&r, delivery("push", body.clone(), None)).await;
        let second = h.pipeline.handle(&r, delivery("push", body, None)).await;

        assert_eq!(first, Outcome::Dispatched);
        assert_eq!(second, Outcome::Suppressed);
        assert_eq!(h.sender.sent().len(), 1);
        assert_eq!(h.history.len(&r.history_scope()), 1);
    }

    #[tokio::test]
    async fn issue_opened_then_closed_are_both_forwarded() {
        let h = harness(summaries());
        let r = route(None);

        let opened = json!({ "action": "opened", "issue": { "number": 42 } });
        let closed = json!({ "action": "closed", "issue": { "number": 42 } });

        assert_eq!(
            h.pipeline.handle(&r, delivery("issues", opened, None)).await,
            Outcome::Dispatched
        );
        assert_eq!(
            h.pipeline.handle(&r, delivery("issues", closed, None)).await,
            Outcome::Dispatched
        );
        let texts: Vec<_> = h.sender.sent().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["event: opened", "event: closed"]);
    }

    #[tokio::test]
    async fn unsubscribed_event_leaves_no_trace() {
        let h = harness(summaries());
        let r = route(None);

        let outcome = h
            .pipeline
            .handle(&r, delivery("deployment", json!({ "id": 1 }), None))
            .await;

        assert_eq!(outcome, Outcome::Rejected(RejectReason::UnsubscribedEvent));
        assert_eq!(h.history.len(&r.history_scope()), 0);
        assert!(h.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn signature_is_checked_when_a_secret_is_set() {
        let h = harness(summaries());
        let r = route(Some("s3cret"));
        let body = json!({ "head_commit": { "id": "abc123" } });
        let good = signature::sign("s3cret", body.to_string().as_bytes());

        let forged = h
            .pipeline
            .handle(&r, delivery("push", body.clone(), Some("sha256=00".to_string())))
            .await;
        let missing = h.pipeline.handle(&r, delivery("push", body.clone(), None)).await;
        let valid = h.pipeline.handle(&r, delivery("push", body, Some(good))).await;

        assert_eq!(forged, Outcome::Rejected(RejectReason::InvalidSignature));
        assert_eq!(missing, Outcome::Rejected(RejectReason::InvalidSignature));
        assert_eq!(valid, Outcome::Dispatched);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let h = harness(summaries());
        let outcome = h
            .pipeline
            .handle(
                &route(None),
                Delivery {
                    event_type: "push".to_string(),
                    delivery_id: None,
                    signature: None,
                    body: Bytes::from_static(b"{not json"),
                },
            )
            .await;

        assert_eq!(outcome, Outcome::Rejected(RejectReason::InvalidPayload));
    }

    #[tokio::test]
    async fn event_without_formatter_is_recorded_only() {
        let h = harness(FormatterRegistry::new());
        let r = route(None);

        let outcome = h
            .pipeline
            .handle(&r, delivery("push", json!({ "after": "def456" }), None))
            .await;

        assert_eq!(outcome, Outcome::Recorded);
        assert_eq!(h.history.len(&r.history_scope()), 1);
        assert!(h.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn dispatch_failures_notify_once_per_window() {
        let h = harness(
            FormatterRegistry::new().with(EventType::new("push").unwrap(), Arc::new(Broken)),
        );
        let r = route(None);

        let first = h
            .pipeline
            .handle(&r, delivery("push", json!({ "after": "a1" }), None))
            .await;
        h.clock.advance(Duration::from_secs(10));
        let second = h
            .pipeline
            .handle(&r, delivery("push", json!({ "after": "a2" }), None))
            .await;

        assert_eq!(first, Outcome::Failed);
        assert_eq!(second, Outcome::Failed);
        let sent = h.sender.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Formatting failed"));
    }

    #[tokio::test]
    async fn sender_failure_is_reported_as_failed() {
        let h = harness(summaries());
        h.sender.fail_next(1);

        let outcome = h
            .pipeline
            .handle(&route(None), delivery("push", json!({ "after": "a1" }), None))
            .await;

        assert_eq!(outcome, Outcome::Failed);
        // One failed forward, then the failure notice.
        assert_eq!(h.sender.attempts(), 2);
        assert!(h.sender.sent()[0].text.contains("Forwarding failed"));
    }
}
