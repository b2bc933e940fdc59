//! Port traits implemented by infrastructure crates.
//!
//! The relay depends only on these abstractions:
//!
//! | Port | Implemented by |
//! |------|----------------|
//! | [`KeyValueStore`] | `storage` (`MemoryStore`, `JsonFileStore`) |
//! | [`MessageSender`] | `messenger` (`HttpMessenger`, `LogMessenger`) |
//! | [`EventFormatter`] | `github` (one formatter per event type) |
//! | [`Clock`] | [`SystemClock`] here; manual clocks in tests |
//!
//! Store and sender calls may be slow or fail. Callers never hold a state
//! lock while awaiting them.

use async_trait::async_trait;

use crate::{FormatError, OutboundMessage, SendError, StoreError, Timestamp};

/// Persistent key-value storage with JSON values.
///
/// Values are opaque to the store; callers own their encoding. A `get` must
/// observe any `set` that completed before it was issued.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Best-effort delivery of a text message to a messaging target.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Sends one message. Returning `Ok` means the transport accepted it;
    /// there is no delivery guarantee beyond that.
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError>;
}

/// Renders one GitHub event payload as notification text.
pub trait EventFormatter: Send + Sync {
    /// Formats `payload` (the parsed webhook body).
    fn format(&self, payload: &serde_json::Value) -> Result<String, FormatError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
