//! Per-bot supervision
//!
//! Each bot gets one supervisor task that owns its worker host, its
//! health-check ticker, its pending restart and its failed-attempt counter.
//! Timers are plain fields polled by the task's `select!` loop, so clearing a
//! field cancels the timer and nothing can fire against a torn-down host.
//!
//! # Status derivation
//!
//! Evaluated in this order, first match wins:
//!
//! 1. `Failed`: failed attempts reached the budget
//! 2. `Stopped`: no host, or the host is disconnected
//! 3. `Unhealthy`: the last health check failed
//! 4. `Restarting`: healthy, but failures not yet cleared by a passing check
//! 5. `Running`

use std::future::pending;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::Instrument;

use bf_core::config::SupervisorConfig;
use bf_core::error::SupervisorError;
use bf_core::traits::{HostLauncher, WorkerHost};
use bf_core::types::{BotDefinition, BotStatus, BotStatusInfo};

enum Command {
    Restart,
    Stop(oneshot::Sender<()>),
}

/// Handle to a running supervisor task
pub struct SupervisorHandle {
    definition: BotDefinition,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<BotStatusInfo>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Spawn a supervisor and begin starting its worker
    ///
    /// Returns immediately; the first start runs on the supervisor task.
    pub fn spawn(
        definition: BotDefinition,
        launcher: Arc<dyn HostLauncher>,
        config: SupervisorConfig,
    ) -> Self {
        let (commands, commands_rx) = mpsc::channel(8);
        let (status_tx, status) = watch::channel(BotStatusInfo::for_definition(
            &definition,
            BotStatus::Stopped,
        ));

        let span = tracing::info_span!("supervisor", replica_id = %definition.replica_id);
        let supervisor = Supervisor {
            definition: definition.clone(),
            launcher,
            config,
            host: None,
            failed_attempts: 0,
            last_healthy: false,
            health_ticker: None,
            restart_at: None,
            status: status_tx,
        };
        let task = tokio::spawn(supervisor.run(commands_rx).instrument(span));

        Self {
            definition,
            commands,
            status,
            task,
        }
    }

    /// Definition this supervisor runs
    pub fn definition(&self) -> &BotDefinition {
        &self.definition
    }

    /// Latest status snapshot
    pub fn status(&self) -> Result<BotStatusInfo, SupervisorError> {
        if self.task.is_finished() {
            return Err(SupervisorError::Gone(self.definition.replica_id.clone()));
        }
        Ok(self.status.borrow().clone())
    }

    /// Watch status snapshots as they are published
    pub fn subscribe(&self) -> watch::Receiver<BotStatusInfo> {
        self.status.clone()
    }

    /// Stop and start the worker
    ///
    /// The failed-attempt counter carries over and is cleared only when the
    /// new worker passes its first health check.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        self.commands
            .send(Command::Restart)
            .await
            .map_err(|_| SupervisorError::Gone(self.definition.replica_id.clone()))
    }

    /// Stop the worker and end the supervisor task
    pub async fn stop(self) {
        let (ack, acked) = oneshot::channel();
        if self.commands.send(Command::Stop(ack)).await.is_ok() {
            let _ = acked.await;
        }
        let _ = self.task.await;
    }
}

struct Supervisor {
    definition: BotDefinition,
    launcher: Arc<dyn HostLauncher>,
    config: SupervisorConfig,
    host: Option<Box<dyn WorkerHost>>,
    failed_attempts: u32,
    last_healthy: bool,
    health_ticker: Option<Interval>,
    restart_at: Option<Instant>,
    status: watch::Sender<BotStatusInfo>,
}

impl Supervisor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.start().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Restart) => self.restart().await,
                    Some(Command::Stop(ack)) => {
                        self.stop().await;
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.stop().await;
                        return;
                    }
                },
                _ = host_closed(self.host.as_deref()) => self.on_host_closed().await,
                _ = tick(self.health_ticker.as_mut()) => self.on_health_tick().await,
                _ = restart_due(self.restart_at) => {
                    self.restart_at = None;
                    self.restart().await;
                }
            }
        }
    }

    async fn start(&mut self) {
        self.clear_timers();

        match self.launcher.launch(&self.definition, &self.config).await {
            Ok(host) => {
                tracing::info!(pid = ?host.pid(), attempts = self.failed_attempts, "Bot started");
                self.host = Some(host);
                self.start_health_checks();

                if self.check_health().await {
                    if self.failed_attempts > 0 {
                        tracing::info!(attempts = self.failed_attempts, "Bot healthy after restart");
                    }
                    self.failed_attempts = 0;
                } else {
                    self.record_failure("initial health check failed").await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start bot");
                self.last_healthy = false;
                self.record_failure("start failed").await;
            }
        }

        self.publish();
    }

    async fn stop(&mut self) {
        self.clear_timers();
        if let Some(host) = self.host.take() {
            host.stop().await;
            tracing::info!("Bot stopped");
        }
        self.last_healthy = false;
        self.publish();
    }

    async fn restart(&mut self) {
        self.restart_at = None;
        self.stop().await;
        self.start().await;
    }

    async fn on_health_tick(&mut self) {
        if self.check_health().await {
            if self.failed_attempts > 0 {
                tracing::info!(attempts = self.failed_attempts, "Bot recovered");
            }
            self.failed_attempts = 0;
        } else {
            self.record_failure("health check failed").await;
        }
        self.publish();
    }

    async fn on_host_closed(&mut self) {
        let pid = self.host.as_ref().and_then(|h| h.pid());
        tracing::warn!(?pid, "Worker exited unexpectedly");

        // A restart is already pending from an earlier failure; don't count twice
        let already_scheduled = self.restart_at.is_some();
        let pending_restart = self.restart_at;
        self.stop().await;

        if already_scheduled {
            self.restart_at = pending_restart;
        } else {
            self.record_failure("worker exited").await;
        }
        self.publish();
    }

    async fn check_health(&mut self) -> bool {
        let healthy = match self.host.as_deref() {
            Some(host) => host.check_health().await,
            None => false,
        };
        self.last_healthy = healthy;
        healthy
    }

    async fn record_failure(&mut self, reason: &str) {
        self.failed_attempts += 1;
        self.last_healthy = false;

        if self.failed_attempts < self.config.max_failed_start_attempts {
            tracing::warn!(
                attempts = self.failed_attempts,
                reason,
                retry_in = ?self.config.health_check_interval,
                "Bot unhealthy, scheduling restart"
            );
            self.schedule_restart();
            return;
        }

        tracing::error!(
            attempts = self.failed_attempts,
            reason,
            "Bot failed too many times, giving up"
        );
        self.stop().await;
    }

    fn schedule_restart(&mut self) {
        self.health_ticker = None;
        self.restart_at = Some(Instant::now() + self.config.health_check_interval);
    }

    fn start_health_checks(&mut self) {
        let period = self.config.health_check_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.health_ticker = Some(ticker);
    }

    fn clear_timers(&mut self) {
        self.health_ticker = None;
        self.restart_at = None;
    }

    fn current_status(&self) -> BotStatus {
        let connected = self.host.as_ref().map_or(false, |h| h.is_connected());

        if self.failed_attempts >= self.config.max_failed_start_attempts {
            BotStatus::Failed
        } else if !connected {
            BotStatus::Stopped
        } else if !self.last_healthy {
            BotStatus::Unhealthy
        } else if self.failed_attempts > 0 {
            BotStatus::Restarting
        } else {
            BotStatus::Running
        }
    }

    fn publish(&self) {
        let info = BotStatusInfo {
            status: self.current_status(),
            pid: self.host.as_ref().and_then(|h| h.pid()),
            ..BotStatusInfo::for_definition(&self.definition, BotStatus::Stopped)
        };
        self.status.send_if_modified(|current| {
            if *current == info {
                return false;
            }
            tracing::debug!(status = %info.status, pid = ?info.pid, "Status changed");
            *current = info;
            true
        });
    }
}

async fn host_closed(host: Option<&dyn WorkerHost>) {
    match host {
        Some(host) => host.closed().await,
        None => pending().await,
    }
}

async fn tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

async fn restart_due(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}
