//! Star and fork notifications.

use pipeline::{EventFormatter, FormatError};
use serde_json::Value;

use crate::payload::{non_empty, repository, sender, str_or, u64_or};

/// `star`: who starred and the new star count.
#[derive(Debug, Default, Clone, Copy)]
pub struct StarFormatter;

impl EventFormatter for StarFormatter {
    fn format(&self, payload: &Value) -> Result<String, FormatError> {
        let heading = match str_or(payload, "/action", "created") {
            "deleted" => "Repository unstarred",
            _ => "Repository starred",
        };
        Ok(format!(
            "[GitHub] {heading}\nRepository: {}\nBy: {}\nStars: {}",
            repository(payload),
            sender(payload),
            u64_or(payload, "/repository/stargazers_count", 0),
        ))
    }
}

/// `fork`: who forked and where the fork lives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkFormatter;

impl EventFormatter for ForkFormatter {
    fn format(&self, payload: &Value) -> Result<String, FormatError> {
        let mut msg = format!(
            "[GitHub] Repository forked\nRepository: {}\nBy: {}\nFork: {}",
            repository(payload),
            sender(payload),
            str_or(payload, "/forkee/full_name", "unknown/repo"),
        );
        if let Some(url) = non_empty(payload, "/forkee/html_url") {
            msg.push_str("\nView: ");
            msg.push_str(url);
        }
        Ok(msg)
    }
}
