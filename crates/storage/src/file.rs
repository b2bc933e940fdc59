use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline::{KeyValueStore, StoreError};
use serde_json::Value;
use tracing::{debug, info, instrument};

/// [`KeyValueStore`] persisted as one JSON object on disk.
///
/// Reads are served from memory. Every `set`/`delete` rewrites the file;
/// rewrites are serialised, and a change becomes visible only once it is on
/// disk, so memory and file never disagree.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
    write_gate: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading existing content.
    ///
    /// A missing file is treated as an empty store and created on the first
    /// write. A file that is not a JSON object is an error.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice::<BTreeMap<String, Value>>(&bytes).map_err(
                |e| StoreError::Serialization {
                    key: path.display().to_string(),
                    message: e.to_string(),
                },
            )?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(unavailable(&path, e)),
        };

        info!(keys = entries.len(), "State file loaded");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            write_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the entries, writes the copy to disk
    /// and only then makes it visible to readers.
    ///
    /// A failed write leaves both memory and the file as they were.
    async fn commit(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, Value>) -> bool,
    ) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;

        let mut next = self.entries.lock().clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.write(&next).await?;
        *self.entries.lock() = next;
        Ok(())
    }

    async fn write(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|e| StoreError::Serialization {
            key: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable(parent, e))?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| unavailable(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| unavailable(&self.path, e))?;

        debug!(bytes = bytes.len(), "State file written");
        Ok(())
    }
}

fn unavailable(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Unavailable {
        message: format!("{}: {e}", path.display()),
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.commit(|entries| {
            entries.insert(key.to_string(), value);
            true
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.commit(|entries| entries.remove(key).is_some()).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("state.json")).await.unwrap();
        assert!(store.get("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = JsonFileStore::open(path.clone()).await.unwrap();
        store.set("github_webhook:configs", json!([{"id": "a"}])).await.unwrap();
        store.set("other", json!(5)).await.unwrap();
        store.delete("other").await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(path).await.unwrap();
        assert_eq!(
            reopened.get("github_webhook:configs").await.unwrap(),
            Some(json!([{"id": "a"}]))
        );
        assert!(reopened.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"[1, 2, 3]").unwrap();

        let err = JsonFileStore::open(path).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[tokio::test]
    async fn blank_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"\n").unwrap();

        let store = JsonFileStore::open(path).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_writes_leave_newest_state_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = std::sync::Arc::new(JsonFileStore::open(path.clone()).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.set(&format!("k{i}"), json!(i)).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let on_disk: BTreeMap<String, Value> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 16);
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonFileStore::open(path.clone()).await.unwrap();
        store.set("kept", json!(1)).await.unwrap();

        // A directory where the temporary file goes makes every write fail.
        std::fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(store.set("new", json!(2)).await.is_err());
        assert!(store.delete("kept").await.is_err());
        assert!(store.get("new").await.unwrap().is_none());
        assert_eq!(store.get("kept").await.unwrap(), Some(json!(1)));
    }
}
