//! In-memory fakes for supervisor and coordinator tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use bf_core::config::SupervisorConfig;
use bf_core::error::{HostError, SourceError};
use bf_core::traits::{HostLauncher, ReplicaSource, WorkerHost};
use bf_core::types::{BotDefinition, ReplicaId};
use bf_protocol::IpcError;

pub fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        health_check_timeout: Duration::from_millis(100),
        health_check_interval: Duration::from_millis(500),
        graceful_shutdown_timeout: Duration::from_millis(100),
        max_failed_start_attempts: 3,
    }
}

pub fn bot(id: &str) -> BotDefinition {
    BotDefinition::new(id, format!("owner-{id}"), format!("token-{id}")).with_slug(id)
}

pub struct FakeHostState {
    pub pid: u32,
    pub replica_id: ReplicaId,
    alive: watch::Sender<bool>,
}

impl FakeHostState {
    /// Simulate the worker process dying
    pub fn crash(&self) {
        self.alive.send_replace(false);
    }

    pub fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }
}

struct FakeHost {
    state: Arc<FakeHostState>,
    launcher: Arc<LauncherState>,
}

#[async_trait]
impl WorkerHost for FakeHost {
    fn pid(&self) -> Option<u32> {
        self.state.is_alive().then_some(self.state.pid)
    }

    fn is_connected(&self) -> bool {
        self.state.is_alive()
    }

    async fn check_health(&self) -> bool {
        self.state.is_alive()
            && self.launcher.healthy.load(Ordering::SeqCst)
            && !self
                .launcher
                .unhealthy
                .lock()
                .unwrap()
                .contains(&self.state.replica_id)
    }

    async fn closed(&self) {
        let mut alive = self.state.alive.subscribe();
        let _ = alive.wait_for(|alive| !*alive).await;
    }

    async fn stop(&self) {
        if self.state.alive.send_replace(false) {
            self.launcher.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
struct LauncherState {
    healthy: AtomicBool,
    not_ready: AtomicBool,
    unhealthy: Mutex<HashSet<ReplicaId>>,
    launches: AtomicUsize,
    stops: AtomicUsize,
    next_pid: AtomicU32,
    hosts: Mutex<Vec<Arc<FakeHostState>>>,
}

/// Launcher whose hosts live in memory
#[derive(Clone)]
pub struct FakeLauncher {
    state: Arc<LauncherState>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        let state = LauncherState {
            healthy: AtomicBool::new(true),
            next_pid: AtomicU32::new(1000),
            ..Default::default()
        };
        Self {
            state: Arc::new(state),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make one replica's health checks fail
    pub fn set_unhealthy(&self, replica_id: &str) {
        self.state
            .unhealthy
            .lock()
            .unwrap()
            .insert(ReplicaId::from(replica_id));
    }

    /// Make every launch fail as a worker that never reports ready
    pub fn set_not_ready(&self, not_ready: bool) {
        self.state.not_ready.store(not_ready, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn hosts(&self) -> Vec<Arc<FakeHostState>> {
        self.state.hosts.lock().unwrap().clone()
    }

    pub fn alive_hosts(&self) -> Vec<Arc<FakeHostState>> {
        self.hosts().into_iter().filter(|h| h.is_alive()).collect()
    }
}

#[async_trait]
impl HostLauncher for FakeLauncher {
    async fn launch(
        &self,
        definition: &BotDefinition,
        config: &SupervisorConfig,
    ) -> Result<Box<dyn WorkerHost>, HostError> {
        self.state.launches.fetch_add(1, Ordering::SeqCst);

        if self.state.not_ready.load(Ordering::SeqCst) {
            tokio::time::sleep(config.health_check_timeout).await;
            return Err(HostError::NotReady {
                replica_id: definition.replica_id.clone(),
                source: IpcError::Disconnected,
            });
        }

        let (alive, _) = watch::channel(true);
        let state = Arc::new(FakeHostState {
            pid: self.state.next_pid.fetch_add(1, Ordering::SeqCst),
            replica_id: definition.replica_id.clone(),
            alive,
        });
        self.state.hosts.lock().unwrap().push(Arc::clone(&state));

        Ok(Box::new(FakeHost {
            state,
            launcher: Arc::clone(&self.state),
        }))
    }
}

/// Desired-state source backed by a mutable list
#[derive(Clone, Default)]
pub struct FakeSource {
    bots: Arc<Mutex<Vec<BotDefinition>>>,
    offline: Arc<AtomicBool>,
}

impl FakeSource {
    pub fn with_bots(bots: Vec<BotDefinition>) -> Self {
        let source = Self::default();
        source.set_bots(bots);
        source
    }

    pub fn set_bots(&self, bots: Vec<BotDefinition>) {
        *self.bots.lock().unwrap() = bots;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), SourceError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SourceError::Status {
                status: 503,
                message: "source offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ReplicaSource for FakeSource {
    async fn list_bots(&self) -> Result<Vec<BotDefinition>, SourceError> {
        self.check_online()?;
        Ok(self.bots.lock().unwrap().clone())
    }

    async fn get_bot(&self, replica_id: &ReplicaId) -> Result<Option<BotDefinition>, SourceError> {
        self.check_online()?;
        Ok(self
            .bots
            .lock()
            .unwrap()
            .iter()
            .find(|b| &b.replica_id == replica_id)
            .cloned())
    }
}
