//! Fleet coordinator
//!
//! The `Coordinator` is the single owner of the running-state map. Both the
//! periodic reconciliation loop and the HTTP surface go through the same
//! async mutex, so every mutation of the map is serialized.
//!
//! # Reconciliation
//!
//! Each tick fetches the full desired state. A fetch error aborts the tick
//! and keeps the current fleet. Otherwise every desired bot is added or
//! updated and every supervisor missing from desired state is deleted.
//! An unchanged definition is left alone, even when its bot has `Failed`;
//! only an explicit update revives it.
//!
//! # Checked mutations
//!
//! The `*_checked` variants re-read the source before mutating and refuse
//! with [`CoordinatorError::OutOfSync`] when the source disagrees with the
//! requested change. They only guarantee agreement at the moment of the
//! check, not until the next tick.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use bf_core::config::{FleetConfig, SupervisorConfig};
use bf_core::error::CoordinatorError;
use bf_core::traits::{HostLauncher, ReplicaSource};
use bf_core::types::{
    BotDefinition, BotDefinitionPatch, BotOperationResult, BotStatus, BotStatusInfo, ReplicaId,
};

use crate::supervisor::SupervisorHandle;

/// Desired definitions and the supervisors running them
#[derive(Default)]
struct Fleet {
    desired: HashMap<ReplicaId, BotDefinition>,
    supervisors: HashMap<ReplicaId, SupervisorHandle>,
}

/// Owns every bot supervisor and keeps them in line with the source
pub struct Coordinator {
    source: Arc<dyn ReplicaSource>,
    launcher: Arc<dyn HostLauncher>,
    supervisor_config: SupervisorConfig,
    reload_interval: Duration,
    status_report_interval: Duration,
    fleet: Mutex<Fleet>,
}

impl Coordinator {
    pub fn new(
        config: &FleetConfig,
        source: Arc<dyn ReplicaSource>,
        launcher: Arc<dyn HostLauncher>,
    ) -> Self {
        Self {
            source,
            launcher,
            supervisor_config: config.supervisor.clone(),
            reload_interval: config.reload_interval,
            status_report_interval: config.status_report_interval,
            fleet: Mutex::new(Fleet::default()),
        }
    }

    /// Run one reconciliation pass, then keep reconciling until `cancel` fires
    ///
    /// The first pass completes before this returns. The returned task also
    /// logs a periodic status summary and shuts the fleet down on cancel.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        self.reconcile_logged().await;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut reload = interval_at(Instant::now() + this.reload_interval, this.reload_interval);
            reload.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut report = interval_at(
                Instant::now() + this.status_report_interval,
                this.status_report_interval,
            );
            report.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = reload.tick() => this.reconcile_logged().await,
                    _ = report.tick() => this.report_status().await,
                }
            }

            this.shutdown().await;
        })
    }

    async fn reconcile_logged(&self) {
        match self.reconcile().await {
            Ok(()) => {}
            Err(e) => tracing::warn!(error = %e, "Reconciliation skipped, keeping current fleet"),
        }
    }

    /// Bring the running fleet in line with the source
    pub async fn reconcile(&self) -> Result<(), CoordinatorError> {
        let bots = self.source.list_bots().await?;

        let mut desired = HashMap::with_capacity(bots.len());
        for bot in bots {
            if let Some(previous) = desired.insert(bot.replica_id.clone(), bot) {
                tracing::warn!(replica_id = %previous.replica_id, "Duplicate replica in source, keeping the last one");
            }
        }

        let mut fleet = self.fleet.lock().await;
        let mut created = 0usize;
        let mut updated = 0usize;

        for definition in desired.values() {
            let replica_id = definition.replica_id.clone();
            let result = if fleet.supervisors.contains_key(&replica_id) {
                self.update_locked(&mut fleet, definition.clone().into(), false)
                    .await
            } else {
                self.add_locked(&mut fleet, definition.clone()).await
            };
            match result {
                BotOperationResult::Created => created += 1,
                BotOperationResult::Updated => updated += 1,
                other => {
                    tracing::warn!(%replica_id, result = ?other, "Unexpected reconciliation result")
                }
            }
        }

        let stale: Vec<ReplicaId> = fleet
            .supervisors
            .keys()
            .filter(|id| !desired.contains_key(*id))
            .cloned()
            .collect();
        let deleted = stale.len();
        let removed: Vec<SupervisorHandle> = stale
            .iter()
            .filter_map(|id| fleet.supervisors.remove(id))
            .collect();
        join_all(removed.into_iter().map(SupervisorHandle::stop)).await;

        fleet.desired = desired;
        tracing::info!(
            desired = fleet.desired.len(),
            created,
            updated,
            deleted,
            "Reconciliation complete"
        );
        Ok(())
    }

    /// Start a supervisor for `definition`, replacing any existing one
    pub async fn add_bot(&self, definition: BotDefinition) -> BotOperationResult {
        let mut fleet = self.fleet.lock().await;
        self.add_locked(&mut fleet, definition).await
    }

    /// Merge `patch` onto the current definition and rebuild the bot if it changed
    ///
    /// An unchanged definition restarts the bot only if it has `Failed`.
    pub async fn update_bot(&self, patch: BotDefinitionPatch) -> BotOperationResult {
        let mut fleet = self.fleet.lock().await;
        self.update_locked(&mut fleet, patch, true).await
    }

    /// Stop and forget a bot
    pub async fn delete_bot(&self, replica_id: &ReplicaId) -> BotOperationResult {
        let handle = {
            let mut fleet = self.fleet.lock().await;
            fleet.desired.remove(replica_id);
            fleet.supervisors.remove(replica_id)
        };

        match handle {
            Some(handle) => {
                handle.stop().await;
                tracing::info!(%replica_id, "Bot deleted");
                BotOperationResult::Deleted
            }
            None => BotOperationResult::NotFound,
        }
    }

    /// [`add_bot`](Self::add_bot), after confirming the source has exactly this definition
    pub async fn add_bot_checked(
        &self,
        definition: BotDefinition,
    ) -> Result<BotOperationResult, CoordinatorError> {
        let remote = self.source.get_bot(&definition.replica_id).await?;
        ensure_matches(&definition, remote.as_ref())?;
        Ok(self.add_bot(definition).await)
    }

    /// [`update_bot`](Self::update_bot), after confirming the source has the merged definition
    pub async fn update_bot_checked(
        &self,
        patch: BotDefinitionPatch,
    ) -> Result<BotOperationResult, CoordinatorError> {
        let current = self.definition(&patch.replica_id).await;
        let Some(merged) = patch.clone().merge(current.as_ref()) else {
            return Ok(BotOperationResult::NotFound);
        };

        let remote = self.source.get_bot(&merged.replica_id).await?;
        ensure_matches(&merged, remote.as_ref())?;
        Ok(self.update_bot(patch).await)
    }

    /// [`delete_bot`](Self::delete_bot), after confirming the source no longer has the bot
    pub async fn delete_bot_checked(
        &self,
        replica_id: &ReplicaId,
    ) -> Result<BotOperationResult, CoordinatorError> {
        if self.source.get_bot(replica_id).await?.is_some() {
            return Err(CoordinatorError::OutOfSync {
                replica_id: replica_id.clone(),
                reason: "replica is still present in the source".to_string(),
            });
        }
        Ok(self.delete_bot(replica_id).await)
    }

    /// Current definition of a running bot
    pub async fn definition(&self, replica_id: &ReplicaId) -> Option<BotDefinition> {
        let fleet = self.fleet.lock().await;
        fleet
            .supervisors
            .get(replica_id)
            .map(|h| h.definition().clone())
    }

    /// True only when every desired bot has a supervisor and all are running
    pub async fn is_healthy(&self) -> bool {
        let fleet = self.fleet.lock().await;
        fleet.supervisors.len() == fleet.desired.len()
            && fleet
                .supervisors
                .values()
                .all(|h| matches!(h.status(), Ok(info) if info.status == BotStatus::Running))
    }

    /// Status of every supervised bot, sorted by replica ID
    pub async fn get_status(&self) -> Vec<BotStatusInfo> {
        let fleet = self.fleet.lock().await;
        let mut statuses: Vec<BotStatusInfo> = fleet
            .supervisors
            .values()
            .map(|handle| match handle.status() {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(error = %e, "Status lookup failed");
                    BotStatusInfo::for_definition(handle.definition(), BotStatus::Unhealthy)
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.replica_id.cmp(&b.replica_id));
        statuses
    }

    /// Stop every bot and empty the running-state map
    pub async fn shutdown(&self) {
        let handles: Vec<SupervisorHandle> = {
            let mut fleet = self.fleet.lock().await;
            fleet.supervisors.drain().map(|(_, h)| h).collect()
        };
        let count = handles.len();
        join_all(handles.into_iter().map(SupervisorHandle::stop)).await;
        tracing::info!(count, "All bots stopped");
    }

    async fn report_status(&self) {
        let statuses = self.get_status().await;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for info in &statuses {
            *counts.entry(info.status.to_string()).or_default() += 1;
        }
        tracing::info!(total = statuses.len(), ?counts, "Fleet status");

        for info in statuses.iter().filter(|i| i.status != BotStatus::Running) {
            tracing::warn!(
                replica_id = %info.replica_id,
                slug = info.slug.as_deref().unwrap_or("-"),
                status = %info.status,
                pid = ?info.pid,
                "Bot not running"
            );
        }
    }

    async fn add_locked(&self, fleet: &mut Fleet, definition: BotDefinition) -> BotOperationResult {
        let replica_id = definition.replica_id.clone();
        if let Some(previous) = fleet.supervisors.remove(&replica_id) {
            previous.stop().await;
        }

        let handle = SupervisorHandle::spawn(
            definition.clone(),
            Arc::clone(&self.launcher),
            self.supervisor_config.clone(),
        );
        fleet.supervisors.insert(replica_id.clone(), handle);
        fleet.desired.insert(replica_id.clone(), definition);
        tracing::info!(%replica_id, "Bot added");
        BotOperationResult::Created
    }

    async fn update_locked(
        &self,
        fleet: &mut Fleet,
        patch: BotDefinitionPatch,
        revive_failed: bool,
    ) -> BotOperationResult {
        let replica_id = patch.replica_id.clone();
        let existing = fleet.supervisors.get(&replica_id).map(|h| h.definition().clone());

        let Some(merged) = patch.merge(existing.as_ref()) else {
            return BotOperationResult::NotFound;
        };

        if existing.as_ref() == Some(&merged) {
            if revive_failed {
                self.revive_locked(fleet, &merged).await;
            }
            fleet.desired.insert(replica_id, merged);
            return BotOperationResult::Updated;
        }

        let existed = existing.is_some();
        self.add_locked(fleet, merged).await;
        if existed {
            tracing::info!(%replica_id, "Bot definition changed, rebuilt");
            BotOperationResult::Updated
        } else {
            BotOperationResult::Created
        }
    }

    /// Restart a bot that gave up; respawn it if its supervisor has ended
    async fn revive_locked(&self, fleet: &mut Fleet, definition: &BotDefinition) {
        let replica_id = &definition.replica_id;
        let Some(handle) = fleet.supervisors.get(replica_id) else {
            return;
        };

        let restarted = match handle.status() {
            Ok(info) if info.status != BotStatus::Failed => return,
            Ok(_) => handle.restart().await,
            Err(e) => Err(e),
        };

        match restarted {
            Ok(()) => tracing::info!(%replica_id, "Restarting failed bot"),
            Err(e) => {
                tracing::warn!(%replica_id, error = %e, "Supervisor ended, respawning bot");
                self.add_locked(fleet, definition.clone()).await;
            }
        }
    }
}

fn ensure_matches(
    expected: &BotDefinition,
    remote: Option<&BotDefinition>,
) -> Result<(), CoordinatorError> {
    match remote {
        Some(remote) if remote == expected => Ok(()),
        Some(_) => Err(CoordinatorError::OutOfSync {
            replica_id: expected.replica_id.clone(),
            reason: "source has a different definition".to_string(),
        }),
        None => Err(CoordinatorError::OutOfSync {
            replica_id: expected.replica_id.clone(),
            reason: "replica is not present in the source".to_string(),
        }),
    }
}
