use std::collections::BTreeSet;
use std::sync::Arc;

use pipeline::{
    Clock, FormatterRegistry, HistoryRecord, KeyValueStore, MessageSender, RouteConfig, RouteId,
    TargetId,
};
use tracing::{info, instrument, warn};

use crate::dedup::DedupStore;
use crate::history::HistoryLog;
use crate::maintenance::{SweepReport, Sweeper};
use crate::notifier::ErrorNotifier;
use crate::routes::{RegistryError, RouteRegistry};
use crate::settings::RelaySettings;
use crate::webhook::{Delivery, Outcome, WebhookPipeline};

/// What [`Relay::start`] found in storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub routes_restored: usize,
    pub routes_failed: usize,
    pub dedup_entries: usize,
    pub history_records: usize,
    pub sweep: SweepReport,
}

/// All relay components wired to one store, sender and clock.
///
/// Built once by the composition root and shared with the HTTP layer.
pub struct Relay {
    settings: RelaySettings,
    registry: Arc<RouteRegistry>,
    dedup: Arc<DedupStore>,
    history: Arc<HistoryLog>,
    pipeline: WebhookPipeline,
    sweeper: Arc<Sweeper>,
    clock: Arc<dyn Clock>,
}

impl Relay {
    pub fn new(
        settings: RelaySettings,
        store: Arc<dyn KeyValueStore>,
        sender: Arc<dyn MessageSender>,
        formatters: FormatterRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Arc::new(RouteRegistry::new(
            store.clone(),
            settings.path_prefix.clone(),
        ));
        let dedup = Arc::new(DedupStore::new(store.clone(), settings.dedup_ttl));
        let history = Arc::new(HistoryLog::new(
            store.clone(),
            settings.max_history_records,
        ));
        let notifier = Arc::new(ErrorNotifier::new(
            store,
            sender.clone(),
            settings.error_ratelimit,
        ));
        let pipeline = WebhookPipeline::new(
            dedup.clone(),
            history.clone(),
            notifier,
            Arc::new(formatters),
            sender,
            clock.clone(),
        );
        let sweeper = Arc::new(Sweeper::new(
            dedup.clone(),
            history.clone(),
            clock.clone(),
            settings.dedup_ttl,
            settings.history_ttl,
        ));

        Self {
            settings,
            registry,
            dedup,
            history,
            pipeline,
            sweeper,
            clock,
        }
    }

    /// Loads persisted state, restores live routes and runs one sweep.
    ///
    /// Must complete before the first delivery is handled.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<StartupReport, RegistryError> {
        let dedup_entries = self.dedup.load().await;
        let restored = self.registry.restore_all().await?;

        let targets: BTreeSet<TargetId> = self
            .registry
            .list(None)
            .await?
            .into_iter()
            .map(|c| c.target_id)
            .collect();
        let history_records = self.history.load(targets).await;

        let sweep = self.sweeper.run_once().await;

        let report = StartupReport {
            routes_restored: restored.restored,
            routes_failed: restored.failed,
            dedup_entries,
            history_records,
            sweep,
        };
        if report.routes_failed > 0 {
            warn!(failed = report.routes_failed, "Some routes could not be restored");
        }
        info!(
            routes = report.routes_restored,
            dedup_entries, history_records, "Relay started"
        );
        Ok(report)
    }

    /// Runs the delivery through the pipeline of the live route on `path`.
    ///
    /// Returns `None` if no live route is served there.
    pub async fn handle(&self, path: &str, delivery: Delivery) -> Option<Outcome> {
        let route = self.registry.lookup(path)?;
        Some(self.pipeline.handle(&route, delivery).await)
    }

    /// Removes a subscription.
    ///
    /// Its history is dropped too unless another route still covers the
    /// same target and repository.
    #[instrument(skip(self), fields(route_id = %id))]
    pub async fn remove_route(&self, id: &RouteId) -> Result<RouteConfig, RegistryError> {
        let removed = self.registry.remove(id).await?;
        let scope = removed.history_scope();
        let shared = self
            .registry
            .list(Some(&removed.target_id))
            .await?
            .iter()
            .any(|c| c.history_scope() == scope);
        if !shared {
            self.history.forget(&scope).await;
        }
        Ok(removed)
    }

    /// Most recent history for `route`, newest first.
    pub fn recent_history(&self, route: &RouteConfig, n: usize) -> Vec<HistoryRecord> {
        self.history.recent(&route.history_scope(), n)
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// The periodic maintenance task's worker.
    pub fn sweeper(&self) -> Arc<Sweeper> {
        self.sweeper.clone()
    }
}
