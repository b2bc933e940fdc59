//! Route registry: the persisted subscription list and the live route table.
//!
//! | Operation | Storage | Live table |
//! |-----------|---------|------------|
//! | [`RouteRegistry::create`] | appends the new config | registers it |
//! | [`RouteRegistry::remove`] | drops the config | unregisters it (restored on failure) |
//! | [`RouteRegistry::set_enabled`] | rewrites the config | registers or unregisters it |
//! | [`RouteRegistry::restore_all`] | reads every config | registers the enabled ones |
//! | [`RouteRegistry::lookup`] | none | read only |
//!
//! Mutations are serialized by an async gate so concurrent calls never lose
//! updates to the persisted list. Lookups only take the read side of the
//! live-table lock and never wait on the gate.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use pipeline::{
    EventType, KeyValueStore, PlatformName, RepositoryName, RouteConfig, RouteId, StoreError,
    TargetId, TargetType, Timestamp, WebhookPath,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::persist;

/// Attempts made to find an unused route id before giving up.
const ID_ATTEMPTS: usize = 3;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a registry operation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Reading or writing the persisted list failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No persisted route has this id.
    #[error("Route '{id}' not found")]
    NotFound {
        /// Requested id.
        id: RouteId,
    },

    /// The route is disabled and cannot be served.
    #[error("Route '{id}' is disabled")]
    Disabled {
        /// Id of the disabled route.
        id: RouteId,
    },

    /// Every generated id was already taken.
    #[error("Could not allocate a unique route id after {attempts} attempts")]
    IdCollision {
        /// Number of ids tried.
        attempts: usize,
    },

    /// The subscription request is not acceptable.
    #[error("Invalid route: {message}")]
    Invalid {
        /// What was wrong with it.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// A subscription request, before an id and timestamp are assigned.
#[derive(Debug, Clone)]
pub struct NewRoute {
    pub target_id: TargetId,
    pub target_type: TargetType,
    pub platform: PlatformName,
    pub repository: RepositoryName,
    pub events: BTreeSet<EventType>,
    /// Empty strings are treated as no secret.
    pub secret: Option<String>,
}

/// Result of [`RouteRegistry::restore_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Enabled configs registered as live routes.
    pub restored: usize,
    /// Persisted records that could not be decoded.
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct RouteRegistry {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    live: RwLock<HashMap<String, Arc<RouteConfig>>>,
    mutation_gate: tokio::sync::Mutex<()>,
}

impl RouteRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            live: RwLock::new(HashMap::new()),
            mutation_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// First path segment of every webhook URL.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Installs `config` as a live route and returns its path.
    ///
    /// Registering the same route again replaces the entry in one step.
    pub fn register(&self, config: RouteConfig) -> Result<WebhookPath, RegistryError> {
        if !config.enabled {
            return Err(RegistryError::Disabled { id: config.id });
        }
        let path = config.path(&self.prefix);
        self.live
            .write()
            .insert(path.as_str().to_string(), Arc::new(config));
        Ok(path)
    }

    /// Registers every enabled persisted config.
    ///
    /// Records that fail to decode are logged and counted; they do not stop
    /// the remaining records from being restored.
    #[instrument(skip(self))]
    pub async fn restore_all(&self) -> Result<RestoreSummary, RegistryError> {
        let _gate = self.mutation_gate.lock().await;
        let raw = self.load_raw().await?;

        let mut summary = RestoreSummary::default();
        for (index, value) in raw.into_iter().enumerate() {
            let config = match serde_json::from_value::<RouteConfig>(value) {
                Ok(config) => config,
                Err(e) => {
                    warn!(index, error = %e, "Skipping unreadable route config");
                    summary.failed += 1;
                    continue;
                }
            };
            if !config.enabled {
                continue;
            }
            let route_key = config.route_key();
            match self.register(config) {
                Ok(path) => {
                    info!(route_key = %route_key, path = %path, "Route restored");
                    summary.restored += 1;
                }
                Err(e) => {
                    warn!(route_key = %route_key, error = %e, "Failed to restore route");
                    summary.failed += 1;
                }
            }
        }

        info!(
            restored = summary.restored,
            failed = summary.failed,
            "Route restoration finished"
        );
        Ok(summary)
    }

    /// Creates, persists and registers a new subscription.
    #[instrument(skip(self, request), fields(target_id = %request.target_id, repository = %request.repository))]
    pub async fn create(
        &self,
        request: NewRoute,
        now: Timestamp,
    ) -> Result<(RouteConfig, WebhookPath), RegistryError> {
        validate(&request)?;

        let _gate = self.mutation_gate.lock().await;
        let mut raw = self.load_raw().await?;

        let mut taken: HashSet<RouteId> = raw.iter().filter_map(raw_id).collect();
        taken.extend(self.live.read().values().map(|c| c.id.clone()));
        let id = (0..ID_ATTEMPTS)
            .map(|_| RouteId::random())
            .find(|candidate| !taken.contains(candidate))
            .ok_or(RegistryError::IdCollision {
                attempts: ID_ATTEMPTS,
            })?;

        let config = RouteConfig {
            id,
            target_id: request.target_id,
            target_type: request.target_type,
            platform: request.platform,
            repository: request.repository,
            subscribed_events: request.events,
            secret: request.secret.filter(|s| !s.is_empty()),
            enabled: true,
            created_at: now,
        };
        raw.push(encode(&config)?);
        persist::save(self.store.as_ref(), persist::CONFIGS_KEY, &raw).await?;

        let path = self.register(config.clone())?;
        info!(route_key = %config.route_key(), path = %path, "Route created");
        Ok((config, path))
    }

    /// Removes the route from storage and from the live table.
    ///
    /// The live entry is dropped before the write and put back if the write
    /// fails, so storage and the live table agree once the call returns.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &RouteId) -> Result<RouteConfig, RegistryError> {
        let _gate = self.mutation_gate.lock().await;
        let mut raw = self.load_raw().await?;

        let (index, config) = find(&raw, id).ok_or_else(|| RegistryError::NotFound {
            id: id.clone(),
        })?;
        raw.remove(index);

        let path = config.path(&self.prefix);
        let previous = self.live.write().remove(path.as_str());

        if let Err(e) = persist::save(self.store.as_ref(), persist::CONFIGS_KEY, &raw).await {
            if let Some(entry) = previous {
                self.live.write().insert(path.as_str().to_string(), entry);
            }
            warn!(route_key = %config.route_key(), error = %e, "Route removal not persisted; live route kept");
            return Err(e.into());
        }

        info!(route_key = %config.route_key(), "Route removed");
        Ok(config)
    }

    /// Persists the enabled flag and registers or unregisters the route.
    #[instrument(skip(self))]
    pub async fn set_enabled(
        &self,
        id: &RouteId,
        enabled: bool,
    ) -> Result<RouteConfig, RegistryError> {
        let _gate = self.mutation_gate.lock().await;
        let mut raw = self.load_raw().await?;

        let (index, mut config) = find(&raw, id).ok_or_else(|| RegistryError::NotFound {
            id: id.clone(),
        })?;
        if config.enabled == enabled {
            return Ok(config);
        }
        config.enabled = enabled;
        raw[index] = encode(&config)?;
        persist::save(self.store.as_ref(), persist::CONFIGS_KEY, &raw).await?;

        if enabled {
            self.register(config.clone())?;
        } else {
            self.live.write().remove(config.path(&self.prefix).as_str());
        }
        info!(route_key = %config.route_key(), enabled, "Route toggled");
        Ok(config)
    }

    /// The live route served on `path`, if any.
    pub fn lookup(&self, path: &str) -> Option<Arc<RouteConfig>> {
        self.live.read().get(path).cloned()
    }

    /// Number of live routes.
    pub fn live_count(&self) -> usize {
        self.live.read().len()
    }

    /// Persisted routes, optionally only those for `target`.
    pub async fn list(&self, target: Option<&TargetId>) -> Result<Vec<RouteConfig>, RegistryError> {
        let raw = self.load_raw().await?;
        Ok(raw
            .into_iter()
            .filter_map(|v| serde_json::from_value::<RouteConfig>(v).ok())
            .filter(|c| target.map_or(true, |t| &c.target_id == t))
            .collect())
    }

    /// The persisted route with `id`.
    pub async fn get(&self, id: &RouteId) -> Result<RouteConfig, RegistryError> {
        let raw = self.load_raw().await?;
        find(&raw, id)
            .map(|(_, config)| config)
            .ok_or_else(|| RegistryError::NotFound { id: id.clone() })
    }

    /// Full URL GitHub should deliver to for `config`.
    pub fn webhook_url(&self, config: &RouteConfig, base_url: &str) -> String {
        format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            config.path(&self.prefix)
        )
    }

    /// The persisted list as raw JSON, so unreadable records survive rewrites.
    async fn load_raw(&self) -> Result<Vec<Value>, StoreError> {
        Ok(persist::load(self.store.as_ref(), persist::CONFIGS_KEY)
            .await?
            .unwrap_or_default())
    }
}

/// Characters a target id may contain besides ASCII letters and digits.
/// Anything else could split or escape the single path segment
/// `<target>_<id>`.
const TARGET_ID_PUNCTUATION: &[char] = &['-', '_', '.', ':', '@'];

fn validate(request: &NewRoute) -> Result<(), RegistryError> {
    if let Some(bad) = request
        .target_id
        .as_str()
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !TARGET_ID_PUNCTUATION.contains(c))
    {
        return Err(RegistryError::Invalid {
            message: format!(
                "target id '{}' contains '{bad}'; use letters, digits and {}",
                request.target_id,
                TARGET_ID_PUNCTUATION
                    .iter()
                    .map(|c| format!("'{c}'"))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
        });
    }
    if request.events.is_empty() {
        return Err(RegistryError::Invalid {
            message: "at least one event type is required".to_string(),
        });
    }
    if let Some(unknown) = request
        .events
        .iter()
        .find(|e| !EventType::SUBSCRIBABLE.contains(&e.as_str()))
    {
        return Err(RegistryError::Invalid {
            message: format!("unsupported event type '{unknown}'"),
        });
    }
    Ok(())
}

fn raw_id(value: &Value) -> Option<RouteId> {
    value.get("id").and_then(Value::as_str).and_then(RouteId::new)
}

fn find(raw: &[Value], id: &RouteId) -> Option<(usize, RouteConfig)> {
    raw.iter().enumerate().find_map(|(index, value)| {
        if raw_id(value).as_ref() != Some(id) {
            return None;
        }
        serde_json::from_value(value.clone())
            .ok()
            .map(|config| (index, config))
    })
}

fn encode(config: &RouteConfig) -> Result<Value, StoreError> {
    serde_json::to_value(config).map_err(|e| StoreError::Serialization {
        key: persist::CONFIGS_KEY.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use storage::{JsonFileStore, MemoryStore};

    use super::*;

    fn request(target: &str) -> NewRoute {
        NewRoute {
            target_id: TargetId::new(target).unwrap(),
            target_type: TargetType::Group,
            platform: PlatformName::new("telegram").unwrap(),
            repository: RepositoryName::parse("octo/hello").unwrap(),
            events: BTreeSet::from([
                EventType::new("push").unwrap(),
                EventType::new("issues").unwrap(),
            ]),
            secret: Some("s3cret".to_string()),
        }
    }

    fn now() -> Timestamp {
        Timestamp::from_unix_seconds(1_700_000_000).unwrap()
    }

    fn registry(store: Arc<dyn KeyValueStore>) -> RouteRegistry {
        RouteRegistry::new(store, "github-webhook")
    }

    #[tokio::test]
    async fn create_persists_and_registers() {
        let backing = Arc::new(MemoryStore::new());
        let reg = registry(backing.clone());

        let (config, path) = reg.create(request("team"), now()).await.unwrap();

        assert_eq!(config.id.as_str().len(), RouteId::LENGTH);
        assert_eq!(path.as_str(), format!("/github-webhook/team_{}", config.id));
        assert_eq!(reg.lookup(path.as_str()).as_deref(), Some(&config));
        assert_eq!(reg.list(None).await.unwrap(), vec![config.clone()]);
        assert_eq!(
            reg.webhook_url(&config, "https://relay.example.com/"),
            format!("https://relay.example.com/github-webhook/team_{}", config.id)
        );
    }

    #[tokio::test]
    async fn create_rejects_empty_event_set() {
        let reg = registry(Arc::new(MemoryStore::new()));
        let mut req = request("team");
        req.events.clear();

        let err = reg.create(req, now()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Invalid { .. }));
        assert_eq!(reg.live_count(), 0);
    }

    #[tokio::test]
    async fn register_refuses_disabled_config() {
        let reg = registry(Arc::new(MemoryStore::new()));
        let (mut config, _) = reg.create(request("team"), now()).await.unwrap();
        config.enabled = false;

        assert!(matches!(
            reg.register(config),
            Err(RegistryError::Disabled { .. })
        ));
    }

    #[tokio::test]
    async fn remove_clears_lookup_and_storage() {
        let reg = registry(Arc::new(MemoryStore::new()));
        let (config, path) = reg.create(request("team"), now()).await.unwrap();

        reg.remove(&config.id).await.unwrap();

        assert!(reg.lookup(path.as_str()).is_none());
        assert!(reg.list(None).await.unwrap().is_empty());
        assert!(matches!(
            reg.remove(&config.id).await,
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn restore_registers_exactly_the_enabled_routes() {
        let backing = Arc::new(MemoryStore::new());
        let (kept, off) = {
            let reg = registry(backing.clone());
            let (kept, _) = reg.create(request("team"), now()).await.unwrap();
            let (off, _) = reg.create(request("other"), now()).await.unwrap();
            reg.set_enabled(&off.id, false).await.unwrap();
            (kept, off)
        };

        let restarted = registry(backing);
        let summary = restarted.restore_all().await.unwrap();

        assert_eq!(summary, RestoreSummary { restored: 1, failed: 0 });
        assert!(restarted
            .lookup(kept.path("github-webhook").as_str())
            .is_some());
        assert!(restarted
            .lookup(off.path("github-webhook").as_str())
            .is_none());
    }

    #[tokio::test]
    async fn unreadable_record_is_skipped_and_preserved() {
        let backing = Arc::new(MemoryStore::new());
        backing
            .set(persist::CONFIGS_KEY, json!([{ "id": "broken" }]))
            .await
            .unwrap();
        let reg = registry(backing.clone());

        let summary = reg.restore_all().await.unwrap();
        assert_eq!(summary, RestoreSummary { restored: 0, failed: 1 });

        reg.create(request("team"), now()).await.unwrap();
        let raw = backing.get(persist::CONFIGS_KEY).await.unwrap().unwrap();
        assert_eq!(raw.as_array().map(Vec::len), Some(2));
        assert_eq!(raw[0], json!({ "id": "broken" }));
    }

    #[tokio::test]
    async fn toggling_updates_live_table() {
        let reg = registry(Arc::new(MemoryStore::new()));
        let (config, path) = reg.create(request("team"), now()).await.unwrap();

        let off = reg.set_enabled(&config.id, false).await.unwrap();
        assert!(!off.enabled);
        assert!(reg.lookup(path.as_str()).is_none());
        assert!(!reg.get(&config.id).await.unwrap().enabled);

        reg.set_enabled(&config.id, true).await.unwrap();
        assert!(reg.lookup(path.as_str()).is_some());
    }

    #[tokio::test]
    async fn list_filters_by_target() {
        let reg = registry(Arc::new(MemoryStore::new()));
        reg.create(request("a"), now()).await.unwrap();
        reg.create(request("b"), now()).await.unwrap();

        let only_a = reg.list(TargetId::new("a").as_ref()).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].target_id.as_str(), "a");
    }

    #[tokio::test]
    async fn concurrent_creates_keep_every_route() {
        let reg = Arc::new(registry(Arc::new(MemoryStore::new())));
        let mut tasks = Vec::new();
        for i in 0..10 {
            let reg = reg.clone();
            tasks.push(tokio::spawn(async move {
                reg.create(request(&format!("t{i}")), now()).await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        assert_eq!(reg.list(None).await.unwrap().len(), 10);
        assert_eq!(reg.live_count(), 10);
    }

    /// Reads succeed; every write fails.
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl KeyValueStore for ReadOnlyStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.0.get(key).await
        }

        async fn set(&self, _key: &str, _value: Value) -> Result<(), StoreError> {
            Err(StoreError::Unavailable {
                message: "read-only".to_string(),
            })
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable {
                message: "read-only".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn failed_removal_keeps_the_live_route() {
        let seeded = MemoryStore::new();
        let (config, path) = registry(Arc::new(MemoryStore::new()))
            .create(request("team"), now())
            .await
            .unwrap();
        seeded
            .set(persist::CONFIGS_KEY, json!([config.clone()]))
            .await
            .unwrap();

        let reg = registry(Arc::new(ReadOnlyStore(seeded)));
        reg.restore_all().await.unwrap();

        let err = reg.remove(&config.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::Store(_)));
        assert!(reg.lookup(path.as_str()).is_some());
        assert_eq!(reg.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_removal_on_file_store_leaves_storage_and_live_table_agreeing() {
        let dir = tempfile::tempdir().unwrap();
        let path_on_disk = dir.path().join("state.json");
        let reg = registry(Arc::new(JsonFileStore::open(&path_on_disk).await.unwrap()));
        let (config, path) = reg.create(request("team"), now()).await.unwrap();

        // The temporary file cannot be created while a directory sits there.
        std::fs::create_dir(path_on_disk.with_extension("tmp")).unwrap();

        let err = reg.remove(&config.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::Store(_)));
        assert!(reg.lookup(path.as_str()).is_some());
        assert_eq!(reg.list(None).await.unwrap(), vec![config.clone()]);

        std::fs::remove_dir(path_on_disk.with_extension("tmp")).unwrap();
        let reopened = registry(Arc::new(JsonFileStore::open(&path_on_disk).await.unwrap()));
        assert_eq!(reopened.get(&config.id).await.unwrap(), config);
    }

    #[tokio::test]
    async fn create_rejects_target_ids_that_break_the_path() {
        let reg = registry(Arc::new(MemoryStore::new()));

        for target in ["chat/42", "a?b", "x#y", "with space", "%2F"] {
            let err = reg.create(request(target), now()).await.unwrap_err();
            assert!(
                matches!(err, RegistryError::Invalid { .. }),
                "{target} was accepted"
            );
        }
        assert!(reg.list(None).await.unwrap().is_empty());

        for target in ["-1001234567", "team.ops", "user@example.org", "room:1"] {
            let (config, path) = reg.create(request(target), now()).await.unwrap();
            assert_eq!(path.as_str(), format!("/github-webhook/{target}_{}", config.id));
        }
    }
}
