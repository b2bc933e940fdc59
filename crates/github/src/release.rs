use std::fmt::Write;

use pipeline::{EventFormatter, FormatError};
use serde_json::Value;

use crate::payload::{
    array, human_size, non_empty, repository, required, sender, str_or, truncate, u64_or, UNKNOWN,
};

const BODY_LEN: usize = 200;
const MAX_ASSETS: usize = 3;

/// `release`: tag, name, notes and downloadable assets.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReleaseFormatter;

impl EventFormatter for ReleaseFormatter {
    fn format(&self, payload: &Value) -> Result<String, FormatError> {
        let release = required(payload, "release", "release")?;
        let tag = str_or(release, "/tag_name", UNKNOWN);

        let mut msg = format!(
            "[GitHub] Release {}\n",
            str_or(payload, "/action", "published")
        );
        let _ = writeln!(msg, "Repository: {}", repository(payload));
        let _ = writeln!(msg, "Tag: {tag}");
        if let Some(name) = non_empty(release, "/name").filter(|n| *n != tag) {
            let _ = writeln!(msg, "Name: {name}");
        }
        let _ = writeln!(msg, "By: {}", sender(payload));

        if let Some(body) = non_empty(release, "/body") {
            let _ = writeln!(msg, "\n{}", truncate(body, BODY_LEN));
        }

        let assets = array(release, "/assets");
        if !assets.is_empty() {
            let _ = writeln!(msg, "\nAssets ({}):", assets.len());
            for asset in assets.iter().take(MAX_ASSETS) {
                let _ = writeln!(
                    msg,
                    "- {} ({})",
                    str_or(asset, "/name", UNKNOWN),
                    human_size(u64_or(asset, "/size", 0))
                );
            }
            if assets.len() > MAX_ASSETS {
                let _ = writeln!(msg, "- ... and {} more", assets.len() - MAX_ASSETS);
            }
        }

        let _ = write!(msg, "\nDetails: {}", str_or(release, "/html_url", ""));
        Ok(msg)
    }
}
