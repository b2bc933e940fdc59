use std::fmt::Write;

use pipeline::{EventFormatter, FormatError};
use serde_json::Value;

use crate::payload::{array, first_line, non_empty, repository, str_or, truncate, UNKNOWN};

const MAX_COMMITS: usize = 5;
const COMMIT_MESSAGE_LEN: usize = 50;

/// `push`: branch, pusher, commit list and compare link.
#[derive(Debug, Default, Clone, Copy)]
pub struct PushFormatter;

impl EventFormatter for PushFormatter {
    fn format(&self, payload: &Value) -> Result<String, FormatError> {
        let branch = str_or(payload, "/ref", "");
        let branch = branch.strip_prefix("refs/heads/").unwrap_or(branch);
        let commits = array(payload, "/commits");

        let mut msg = format!("[GitHub] Push to {}\n", repository(payload));
        let _ = writeln!(msg, "Branch: {branch}");
        let _ = writeln!(msg, "Pusher: {}", str_or(payload, "/pusher/name", UNKNOWN));
        let _ = writeln!(msg, "Commits: {}", commits.len());

        if !commits.is_empty() {
            msg.push('\n');
        }
        for commit in commits.iter().take(MAX_COMMITS) {
            let text = first_line(str_or(commit, "/message", ""));
            let id: String = str_or(commit, "/id", "").chars().take(7).collect();
            let _ = writeln!(msg, "- {} ({id})", truncate(text, COMMIT_MESSAGE_LEN));
        }
        if commits.len() > MAX_COMMITS {
            let _ = writeln!(msg, "... and {} more", commits.len() - MAX_COMMITS);
        }

        if let Some(compare) = non_empty(payload, "/compare") {
            let _ = write!(msg, "\nCompare: {compare}");
        }
        Ok(msg.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn lists_up_to_five_commits() {
        let commits: Vec<_> = (0..7)
            .map(|i| json!({ "id": format!("{i}abcdef0123"), "message": format!("change {i}\n\nbody") }))
            .collect();
        let payload = json!({
            "ref": "refs/heads/main",
            "repository": { "full_name": "octo/hello" },
            "pusher": { "name": "mona" },
            "commits": commits,
            "compare": "https://github.com/octo/hello/compare/a...b",
        });

        let text = PushFormatter.format(&payload).unwrap();

        assert!(text.starts_with("[GitHub] Push to octo/hello\nBranch: main\nPusher: mona\nCommits: 7"));
        assert!(text.contains("- change 0 (0abcdef)"));
        assert!(text.contains("- change 4 (4abcdef)"));
        assert!(!text.contains("change 5"));
        assert!(text.contains("... and 2 more"));
        assert!(text.ends_with("Compare: https://github.com/octo/hello/compare/a...b"));
    }

    #[test]
    fn long_commit_messages_are_truncated() {
        let payload = json!({
            "ref": "refs/heads/dev",
            "commits": [{ "id": "1234567890", "message": "x".repeat(80) }],
        });

        let text = PushFormatter.format(&payload).unwrap();
        assert!(text.contains(&format!("- {}... (1234567)", "x".repeat(47))));
    }
}
