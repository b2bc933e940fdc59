//! Test doubles for the relay's ports.
//!
//! Available to this crate's tests and, with the `test-support` feature, to
//! other crates' tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline::{Clock, MessageSender, OutboundMessage, SendError, Timestamp};

/// A [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Starts at 2023-11-14T22:13:20Z.
    pub fn new() -> Self {
        Self::starting_at(1_700_000_000)
    }

    pub fn starting_at(unix_seconds: i64) -> Self {
        let start = Timestamp::from_unix_seconds(unix_seconds).unwrap_or_else(Timestamp::now);
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.plus_seconds(by.as_secs() as i64);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

// ---------------------------------------------------------------------------

/// A [`MessageSender`] that records every message and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutboundMessage>>,
    failures_remaining: AtomicUsize,
    attempts: AtomicUsize,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` sends fail with a 502 rejection.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Messages accepted so far, in order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Number of send calls, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SendError::Rejected {
                status: 502,
                message: "gateway unavailable".to_string(),
            });
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}
