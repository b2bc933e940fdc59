//! Content-derived deduplication keys.
//!
//! GitHub may deliver the same logical event more than once (redeliveries,
//! retries after a slow response). The key is computed purely from payload
//! content so independent deliveries of the same event collapse to one
//! notification, while distinct events (a second push, a different action on
//! the same issue) always produce distinct keys.

use serde_json::Value;

use crate::{DedupKey, EventType, RepositoryName};

/// Derives the dedup key for a delivery.
///
/// | Event | Key |
/// |-------|-----|
/// | `push` | `repo:push:<head_commit.id or after>` |
/// | `issues`, `pull_request` | `repo:<type>:<number>:<action>` |
/// | `release` | `repo:release:<tag_name>:<action or "published">` |
/// | `star`, `fork` | `repo:<type>:<sender.id>:<repository.updated_at>` |
///
/// Returns `None` for every other event type; those deliveries are never
/// deduplicated.
pub fn derive_event_key(
    repository: &RepositoryName,
    event_type: &EventType,
    payload: &Value,
) -> Option<DedupKey> {
    let repo = repository.as_str();
    let key = match event_type.as_str() {
        "push" => {
            let commit = payload
                .pointer("/head_commit/id")
                .filter(|v| !v.is_null())
                .or_else(|| payload.get("after"));
            format!("{repo}:push:{}", render(commit))
        }
        kind @ ("issues" | "pull_request") => {
            let number = payload
                .get("number")
                .or_else(|| payload.pointer(&format!("/{}/number", entity_field(kind))));
            format!(
                "{repo}:{kind}:{}:{}",
                render(number),
                render(payload.get("action"))
            )
        }
        "release" => {
            let tag = payload
                .get("tag_name")
                .or_else(|| payload.pointer("/release/tag_name"));
            let action = match payload.get("action") {
                Some(Value::String(a)) if !a.is_empty() => a.as_str(),
                _ => "published",
            };
            format!("{repo}:release:{}:{action}", render(tag))
        }
        kind @ ("star" | "fork") => format!(
            "{repo}:{kind}:{}:{}",
            render(payload.pointer("/sender/id")),
            render(payload.pointer("/repository/updated_at"))
        ),
        _ => return None,
    };
    DedupKey::new(key)
}

fn entity_field(kind: &str) -> &str {
    if kind == "issues" {
        "issue"
    } else {
        kind
    }
}

/// Renders a scalar JSON value for inclusion in a key. Strings are used
/// verbatim, numbers in their JSON form, anything missing as empty.
fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
