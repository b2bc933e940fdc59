//! GitHub webhook payload formatters.
//!
//! Implements [`pipeline::EventFormatter`] for every subscribable event type:
//!
//! | Event | Formatter |
//! |-------|-----------|
//! | `push` | [`PushFormatter`] |
//! | `issues` | [`IssuesFormatter`] |
//! | `pull_request` | [`PullRequestFormatter`] |
//! | `release` | [`ReleaseFormatter`] |
//! | `star` | [`StarFormatter`] |
//! | `fork` | [`ForkFormatter`] |
//! | `workflow_run` | [`WorkflowRunFormatter`] |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate knows GitHub's payload shapes and nothing
//! else; the relay only sees the formatted text.
//!
//! Formatters are lenient: a missing optional field renders as a placeholder.
//! Only payloads lacking the event's main object (an `issues` delivery with no
//! `issue`) fail with [`pipeline::FormatError`].

use std::sync::Arc;

use pipeline::{EventType, FormatterRegistry};

mod issues;
mod payload;
mod push;
mod release;
mod social;
mod workflow;

pub use issues::{IssuesFormatter, PullRequestFormatter};
pub use push::PushFormatter;
pub use release::ReleaseFormatter;
pub use social::{ForkFormatter, StarFormatter};
pub use workflow::WorkflowRunFormatter;

/// A registry with a formatter for every subscribable event type.
pub fn default_formatters() -> FormatterRegistry {
    let mut registry = FormatterRegistry::new();
    let formatters: [(&str, Arc<dyn pipeline::EventFormatter>); 7] = [
        ("push", Arc::new(PushFormatter)),
        ("issues", Arc::new(IssuesFormatter)),
        ("pull_request", Arc::new(PullRequestFormatter)),
        ("release", Arc::new(ReleaseFormatter)),
        ("star", Arc::new(StarFormatter)),
        ("fork", Arc::new(ForkFormatter)),
        ("workflow_run", Arc::new(WorkflowRunFormatter)),
    ];
    for (event, formatter) in formatters {
        if let Some(event_type) = EventType::new(event) {
            registry.register(event_type, formatter);
        }
    }
    registry
}
