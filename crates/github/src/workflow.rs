use std::fmt::Write;

use chrono::DateTime;
use pipeline::{EventFormatter, FormatError};
use serde_json::Value;

use crate::payload::{
    array, first_line, human_size, non_empty, repository, required, str_or, truncate, u64_or,
    UNKNOWN,
};

const COMMIT_MESSAGE_LEN: usize = 50;
const MAX_ARTIFACTS: usize = 3;

/// `workflow_run`: run status, commit, duration and links.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowRunFormatter;

impl EventFormatter for WorkflowRunFormatter {
    fn format(&self, payload: &Value) -> Result<String, FormatError> {
        let run = required(payload, "workflow_run", "workflow_run")?;
        let action = str_or(payload, "/action", "completed");
        let completed = action == "completed";
        let conclusion = non_empty(run, "/conclusion");

        let status = match conclusion {
            Some(conclusion) if completed => conclusion.replace('_', " "),
            _ => str_or(run, "/status", UNKNOWN).replace('_', " "),
        };
        let sha: String = str_or(run, "/head_sha", UNKNOWN).chars().take(7).collect();

        let mut msg = format!("[GitHub] Workflow {}\n", action.replace('_', " "));
        let _ = writeln!(msg, "Repository: {}", repository(payload));
        let _ = writeln!(
            msg,
            "Workflow: {} (#{})",
            str_or(run, "/name", UNKNOWN),
            u64_or(run, "/run_number", 0)
        );
        let _ = writeln!(msg, "Status: {status}");
        let _ = writeln!(msg, "Branch: {}", str_or(run, "/head_branch", UNKNOWN));
        let _ = writeln!(
            msg,
            "Commit: {sha} - {}",
            truncate(
                first_line(str_or(run, "/head_commit/message", UNKNOWN)),
                COMMIT_MESSAGE_LEN
            )
        );
        let _ = writeln!(
            msg,
            "Author: {}",
            str_or(run, "/head_commit/author/name", UNKNOWN)
        );
        if let Some(took) = duration(run) {
            let _ = writeln!(msg, "Duration: {took}");
        }

        if let Some(url) = non_empty(run, "/html_url") {
            let _ = write!(msg, "\nDetails: {url}");
        }
        if completed {
            if let Some(url) = non_empty(run, "/logs_url") {
                let _ = write!(msg, "\nLogs: {url}");
            }
        }

        let artifacts = array(run, "/artifacts");
        if completed && conclusion == Some("success") && !artifacts.is_empty() {
            let _ = write!(msg, "\n\nArtifacts ({}):", artifacts.len());
            for artifact in artifacts.iter().take(MAX_ARTIFACTS) {
                let _ = write!(
                    msg,
                    "\n- {} ({})",
                    str_or(artifact, "/name", UNKNOWN),
                    human_size(u64_or(artifact, "/size_in_bytes", 0))
                );
                if let Some(url) = non_empty(artifact, "/archive_download_url") {
                    let _ = write!(msg, "\n  {url}");
                }
            }
            if artifacts.len() > MAX_ARTIFACTS {
                let _ = write!(msg, "\n- ... and {} more", artifacts.len() - MAX_ARTIFACTS);
            }
        }

        Ok(msg.trim_end().to_string())
    }
}

/// Time from `created_at` to `updated_at`, e.g. `45s`, `3m 12s`, `1h 5m`.
fn duration(run: &Value) -> Option<String> {
    let start = DateTime::parse_from_rfc3339(non_empty(run, "/created_at")?).ok()?;
    let end = DateTime::parse_from_rfc3339(non_empty(run, "/updated_at")?).ok()?;
    let secs = (end - start).num_seconds();
    if secs < 0 {
        return None;
    }
    Some(match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    })
}
