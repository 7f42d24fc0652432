//! Worker process hosting
//!
//! A [`ProcessHost`] owns one worker child process and the IPC channel over
//! its stdin/stdout. It spawns the worker with the bot's identity in the
//! environment, waits for readiness, proxies health checks and performs the
//! two-phase shutdown.

mod signal;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use bf_core::config::{SupervisorConfig, WorkerConfig};
use bf_core::error::HostError;
use bf_core::traits::{HostLauncher, WorkerHost};
use bf_core::types::{BotDefinition, ReplicaId};
use bf_core::WorkerEnv;
use bf_protocol::{HealthCheck, IpcChannel};

/// Orchestrator secrets that must not leak into worker environments
const SCRUBBED_ENV: &[&str] = &["SENSAY_API_KEY", "ORCHESTRATOR_AUTH_TOKEN"];

/// How to run a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment, applied before the bot's own variables
    pub env: HashMap<String, String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Build from config; without a program, re-run this executable as `worker`
    pub fn from_config(config: &WorkerConfig) -> std::io::Result<Self> {
        let (program, mut args) = match &config.program {
            Some(program) => (program.clone(), Vec::new()),
            None => (std::env::current_exe()?, vec!["worker".to_string()]),
        };
        args.extend(config.args.iter().cloned());
        Ok(Self {
            program,
            args,
            env: config.env.clone(),
        })
    }
}

/// One running worker process
pub struct ProcessHost {
    replica_id: ReplicaId,
    pid: Option<u32>,
    channel: IpcChannel,
    exit: watch::Receiver<Option<ExitStatus>>,
    kill: CancellationToken,
    health_check_timeout: Duration,
    graceful_shutdown_timeout: Duration,
    stopping: AtomicBool,
}

impl ProcessHost {
    /// Spawn a worker for `definition` and wait for its `READY`
    ///
    /// A worker that is not ready within `health_check_timeout` is killed
    /// before the error is returned.
    pub async fn spawn(
        definition: &BotDefinition,
        command: &WorkerCommand,
        config: &SupervisorConfig,
    ) -> Result<Self, HostError> {
        let replica_id = definition.replica_id.clone();
        let env = WorkerEnv::from_definition(definition);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .envs(env.to_vars())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for name in SCRUBBED_ENV {
            cmd.env_remove(name);
        }

        let mut child = cmd.spawn().map_err(HostError::Spawn)?;
        let pid = child.id();
        let stdin = child.stdin.take().ok_or(HostError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(HostError::MissingPipe("stdout"))?;

        let channel = IpcChannel::new(format!("host:{}", replica_id), stdout, stdin);

        let (exit_tx, exit) = watch::channel(None);
        let kill = CancellationToken::new();
        let kill_requested = kill.clone();
        let waiter_replica = replica_id.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_requested.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(replica_id = %waiter_replica, error = %e, "Kill failed");
                    }
                    child.wait().await
                }
            };
            match status {
                Ok(status) => {
                    tracing::debug!(replica_id = %waiter_replica, ?pid, %status, "Worker exited");
                    exit_tx.send_replace(Some(status));
                }
                Err(e) => {
                    tracing::warn!(replica_id = %waiter_replica, ?pid, error = %e, "Failed to reap worker");
                }
            }
        });

        let host = Self {
            replica_id,
            pid,
            channel,
            exit,
            kill,
            health_check_timeout: config.health_check_timeout,
            graceful_shutdown_timeout: config.graceful_shutdown_timeout,
            stopping: AtomicBool::new(false),
        };
        tracing::debug!(replica_id = %host.replica_id, ?pid, "Worker spawned");

        if let Err(source) = host.channel.wait_for_ready(config.health_check_timeout).await {
            tracing::warn!(replica_id = %host.replica_id, ?pid, error = %source, "Worker not ready, killing");
            host.force_kill().await;
            return Err(HostError::NotReady {
                replica_id: host.replica_id.clone(),
                source,
            });
        }

        tracing::info!(replica_id = %host.replica_id, ?pid, "Worker ready");
        Ok(host)
    }

    /// Whether the child process has been reaped
    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    async fn wait_exit(&self) {
        let mut exit = self.exit.clone();
        let _ = exit.wait_for(Option::is_some).await;
    }

    async fn force_kill(&self) {
        self.kill.cancel();
        if tokio::time::timeout(self.graceful_shutdown_timeout, self.wait_exit())
            .await
            .is_err()
        {
            tracing::warn!(replica_id = %self.replica_id, pid = ?self.pid, "Worker not reaped after SIGKILL");
        }
    }
}

#[async_trait]
impl WorkerHost for ProcessHost {
    fn pid(&self) -> Option<u32> {
        if self.has_exited() {
            None
        } else {
            self.pid
        }
    }

    fn is_connected(&self) -> bool {
        !self.has_exited() && self.channel.is_connected()
    }

    async fn check_health(&self) -> bool {
        match self
            .channel
            .send_request(HealthCheck, self.health_check_timeout)
            .await
        {
            Ok(report) => report.is_healthy,
            Err(e) => {
                tracing::debug!(replica_id = %self.replica_id, error = %e, "Health check failed");
                false
            }
        }
    }

    async fn closed(&self) {
        tokio::select! {
            _ = self.wait_exit() => {}
            _ = self.channel.closed() => {}
        }
    }

    async fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.channel.remove_all_listeners();

        if self.has_exited() {
            return;
        }

        if let Some(pid) = self.pid {
            if let Err(e) = signal::terminate(pid) {
                tracing::debug!(replica_id = %self.replica_id, pid, error = %e, "SIGTERM failed");
            }
        }

        // Running out the grace period is expected for stubborn workers
        if tokio::time::timeout(self.graceful_shutdown_timeout, self.wait_exit())
            .await
            .is_ok()
        {
            tracing::debug!(replica_id = %self.replica_id, pid = ?self.pid, "Worker exited gracefully");
            return;
        }

        tracing::info!(
            replica_id = %self.replica_id,
            pid = ?self.pid,
            timeout = ?self.graceful_shutdown_timeout,
            "Worker ignored SIGTERM, killing"
        );
        self.force_kill().await;
    }
}

/// Launches workers as child processes
pub struct ProcessLauncher {
    command: WorkerCommand,
}

impl ProcessLauncher {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl HostLauncher for ProcessLauncher {
    async fn launch(
        &self,
        definition: &BotDefinition,
        config: &SupervisorConfig,
    ) -> Result<Box<dyn WorkerHost>, HostError> {
        let host = ProcessHost::spawn(definition, &self.command, config).await?;
        Ok(Box::new(host))
    }
}
