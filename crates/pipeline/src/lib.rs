//! Core domain for the GitHub webhook relay.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, error type and port trait used throughout the relay. Infrastructure
//! crates implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no I/O. It
//! defines *what* is needed (a key-value store, a message sender, event
//! formatters, a clock); infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RouteId`, `TargetId`, `EventType`, …) |
//! | [`types`] | Value types (`RouteConfig`, `HistoryRecord`, `Timestamp`, …) |
//! | [`errors`] | Port errors, `DispatchError`, `RetryPolicy` |
//! | [`ports`] | `KeyValueStore`, `MessageSender`, `EventFormatter`, `Clock` |
//! | [`signature`] | `X-Hub-Signature-256` verification |
//! | [`event_key`] | Content-derived dedup keys |
//! | [`formatting`] | `FormatterRegistry` |

pub mod errors;
pub mod event_key;
pub mod formatting;
pub mod identifiers;
pub mod ports;
pub mod signature;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{DispatchError, FormatError, RetryPolicy, SendError, StoreError};
pub use event_key::derive_event_key;
pub use formatting::FormatterRegistry;
pub use identifiers::{
    DedupKey, EventType, PlatformName, RepositoryName, RouteId, RouteKey, TargetId, WebhookPath,
};
pub use ports::{Clock, EventFormatter, KeyValueStore, MessageSender, SystemClock};
pub use types::{
    HistoryRecord, HistoryScope, OutboundMessage, RouteConfig, TargetType, Timestamp,
};
