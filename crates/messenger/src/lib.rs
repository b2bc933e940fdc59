//! Outbound message senders.
//!
//! Implements [`pipeline::MessageSender`]:
//!
//! - [`HttpMessenger`] posts `{platform, target_type, target_id, text}` to a
//!   messaging gateway's `/send` endpoint, with a timeout and bounded retries.
//! - [`LogMessenger`] writes each message to the log; used when no gateway is
//!   configured.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport, authentication and retry scheduling live
//! here. The relay sees only [`pipeline::MessageSender`] and
//! [`pipeline::SendError`].

mod http;
mod log;

pub use http::{GatewayConfig, GatewayError, HttpMessenger};
pub use log::LogMessenger;
