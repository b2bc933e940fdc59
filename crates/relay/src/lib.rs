//! Webhook relay orchestration.
//!
//! This crate owns the process-scoped state of the relay and the per-delivery
//! pipeline that drives it:
//!
//! | Component | Role |
//! |-----------|------|
//! | [`DedupStore`] | time-windowed set of processed event keys |
//! | [`HistoryLog`] | bounded recent deliveries per (target, repository) |
//! | [`RouteRegistry`] | persisted subscriptions and the live route table |
//! | [`ErrorNotifier`] | rate-limited failure notices to a route's target |
//! | [`WebhookPipeline`] | verify → parse → filter → dedup → record → dispatch |
//! | [`Sweeper`] | periodic eviction of expired state |
//! | [`Relay`] | all of the above wired together, with explicit startup |
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Components sequence calls between the domain
//! rules in [`pipeline`] and its port traits. Storage, messaging and HTTP
//! live in other crates.
//!
//! ## Concurrency
//!
//! State is held in memory behind `parking_lot` locks that are never held
//! across an `.await`. Writes back to the key-value store are serialized per
//! component by a `tokio` mutex so a stale snapshot never overwrites a newer
//! one.

mod dedup;
mod history;
mod maintenance;
mod notifier;
mod persist;
mod routes;
mod service;
mod settings;
mod webhook;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use dedup::DedupStore;
pub use history::HistoryLog;
pub use maintenance::{SweepReport, Sweeper};
pub use notifier::ErrorNotifier;
pub use routes::{NewRoute, RegistryError, RestoreSummary, RouteRegistry};
pub use service::{Relay, StartupReport};
pub use settings::RelaySettings;
pub use webhook::{Delivery, Outcome, RejectReason, WebhookPipeline};
