use pipeline::{EventFormatter, FormatError};
use serde_json::Value;

use crate::payload::{repository, required, sender, str_or, u64_or, UNKNOWN};

/// `issues`: action, title, author and link.
#[derive(Debug, Default, Clone, Copy)]
pub struct IssuesFormatter;

impl EventFormatter for IssuesFormatter {
    fn format(&self, payload: &Value) -> Result<String, FormatError> {
        let issue = required(payload, "issues", "issue")?;
        let action = action_label(str_or(payload, "/action", UNKNOWN));

        Ok(format!(
            "[GitHub] Issue {action}\n\
             Repository: {}\n\
             Title: {}\n\
             By: {}\n\
             Issue #{}: {}",
            repository(payload),
            str_or(issue, "/title", UNKNOWN),
            sender(payload),
            u64_or(issue, "/number", 0),
            str_or(issue, "/html_url", ""),
        ))
    }
}

/// `pull_request`: action, title, branches and link.
#[derive(Debug, Default, Clone, Copy)]
pub struct PullRequestFormatter;

impl EventFormatter for PullRequestFormatter {
    fn format(&self, payload: &Value) -> Result<String, FormatError> {
        let pr = required(payload, "pull_request", "pull_request")?;
        let repo = repository(payload);
        let action = action_label(str_or(payload, "/action", UNKNOWN));

        let head_ref = str_or(pr, "/head/ref", UNKNOWN);
        let base_ref = str_or(pr, "/base/ref", UNKNOWN);
        let head = match str_or(pr, "/head/repo/full_name", "") {
            "" => head_ref.to_string(),
            head_repo if head_repo == repo => head_ref.to_string(),
            head_repo => format!("{head_repo}:{head_ref}"),
        };

        Ok(format!(
            "[GitHub] Pull request {action}\n\
             Repository: {repo}\n\
             Title: {}\n\
             By: {}\n\
             Branch: {head} -> {base_ref}\n\
             PR #{}: {}",
            str_or(pr, "/title", UNKNOWN),
            sender(payload),
            u64_or(pr, "/number", 0),
            str_or(pr, "/html_url", ""),
        ))
    }
}

/// Readable form of a webhook `action` (`review_requested` → `review requested`).
fn action_label(action: &str) -> String {
    action.replace('_', " ")
}
