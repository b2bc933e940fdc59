//! Error and retry-policy types shared across the relay.
//!
//! Each port in [`crate::ports`] has its own error type so adapters report
//! failures in the vocabulary of the port rather than their transport.
//! [`DispatchError`] is the union the webhook pipeline reports when a delivery
//! reached the format/forward stage and could not be completed.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let the caller decide whether
/// to re-invoke an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failure of the key-value store port.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be read or written.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of the underlying failure.
        message: String,
    },

    /// A stored value could not be encoded or decoded.
    #[error("Stored value for '{key}' is invalid: {message}")]
    Serialization {
        /// Key whose value failed to (de)serialise.
        key: String,
        /// Description of the problem.
        message: String,
    },
}

// ---------------------------------------------------------------------------

/// Failure of the outbound messaging port.
#[derive(Debug, Error)]
pub enum SendError {
    /// The gateway answered but refused the message.
    #[error("Message rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status (or equivalent) returned by the gateway.
        status: u16,
        /// Response body or reason, truncated by the adapter.
        message: String,
    },

    /// The gateway could not be reached.
    #[error("Transport failure: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },
}

impl SendError {
    /// Whether re-sending the same message may succeed.
    ///
    /// Server-side (5xx), throttling (429) and transport failures are
    /// retryable; other rejections are not.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Transport { .. } => RetryPolicy::Retryable { after: None },
            Self::Rejected { status, .. } if *status >= 500 || *status == 429 => {
                RetryPolicy::Retryable { after: None }
            }
            Self::Rejected { .. } => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------

/// Failure of an event formatter.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The payload lacked a field the formatter cannot do without.
    #[error("Payload for '{event_type}' is missing '{field}'")]
    MissingField {
        /// Event type being formatted.
        event_type: String,
        /// Dotted path of the missing field.
        field: String,
    },
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// A delivery passed every gate but could not be turned into a notification.
///
/// Produced by the webhook pipeline's format/forward stage. The caller only
/// ever sees a generic internal-error response; the detail is logged and
/// summarised in the rate-limited failure notification.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The formatter for the event type failed.
    #[error("Formatting failed: {0}")]
    Format(#[from] FormatError),

    /// The outbound sender failed.
    #[error("Forwarding failed: {0}")]
    Send(#[from] SendError),
}
