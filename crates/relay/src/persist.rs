//! Typed access to the key-value store and the persisted key layout.
//!
//! | Key | Value |
//! |-----|-------|
//! | `github_webhook:configs` | array of route configs |
//! | `github_webhook:dedup` | `{ dedup key: timestamp }` |
//! | `github_webhook:history:<target>` | `{ repository: [record, …] }`, oldest first |
//! | `github_webhook:error_ratelimit:<target>_<route>` | last notification time |

use pipeline::{KeyValueStore, RouteKey, StoreError, TargetId};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const CONFIGS_KEY: &str = "github_webhook:configs";
pub const DEDUP_KEY: &str = "github_webhook:dedup";

pub fn history_key(target: &TargetId) -> String {
    format!("github_webhook:history:{target}")
}

pub fn error_ratelimit_key(route: &RouteKey) -> String {
    format!("github_webhook:error_ratelimit:{route}")
}

/// Reads and decodes the value under `key`.
pub async fn load<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}

/// Encodes and writes `value` under `key`.
pub async fn save<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|e| StoreError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, value).await
}
