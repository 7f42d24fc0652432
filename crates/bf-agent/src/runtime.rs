//! Worker process main loop

use std::sync::Arc;

use anyhow::Context;
use bf_core::traits::BotClient;
use bf_core::WorkerEnv;
use bf_protocol::IpcChannel;

use crate::agent::BotWorker;
use crate::chaos::ChaosConfig;

/// Why the worker is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    ParentGone,
}

/// Run a worker over this process's stdin/stdout until told to stop
///
/// stdout carries the IPC transport, so nothing else may write to it.
/// Returns after the bot client has been stopped.
pub async fn run_worker<C: BotClient>(
    env: WorkerEnv,
    client: Arc<C>,
) -> anyhow::Result<ShutdownReason> {
    let chaos = match env.chaos.as_deref() {
        Some(faults) => faults.parse::<ChaosConfig>()?,
        None => ChaosConfig::default(),
    };
    if chaos.is_enabled() {
        tracing::warn!(replica_id = %env.replica_id, ?chaos, "Chaos injection enabled");
    }

    let channel = IpcChannel::new(
        format!("worker:{}", env.replica_id),
        tokio::io::stdin(),
        tokio::io::stdout(),
    );
    let worker = BotWorker::new(client, channel, chaos.clone());

    // Installed before READY so an early SIGTERM is never fatal
    let terminate = TerminateSignal::install();

    worker
        .announce()
        .context("Failed to announce readiness")?;
    worker.start().await.context("Bot client failed to start")?;
    tracing::info!(replica_id = %env.replica_id, pid = std::process::id(), "Worker running");

    let reason = wait_for_shutdown(&worker, &chaos, terminate).await;
    tracing::info!(replica_id = %env.replica_id, ?reason, "Worker stopping");

    worker.stop().await.context("Bot client failed to stop")?;
    Ok(reason)
}

/// SIGTERM listener; never fires where the signal does not exist
struct TerminateSignal {
    #[cfg(unix)]
    inner: Option<tokio::signal::unix::Signal>,
}

impl TerminateSignal {
    fn install() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let inner = match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    None
                }
            };
            Self { inner }
        }

        #[cfg(not(unix))]
        Self {}
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(signal) = self.inner.as_mut() {
            signal.recv().await;
            return;
        }
        std::future::pending::<()>().await
    }
}

async fn wait_for_shutdown<C: BotClient>(
    worker: &BotWorker<C>,
    chaos: &ChaosConfig,
    mut terminate: TerminateSignal,
) -> ShutdownReason {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return ShutdownReason::Interrupt,
            _ = terminate.recv() => {
                if chaos.ignore_terminate {
                    tracing::warn!("Chaos: ignoring SIGTERM");
                    continue;
                }
                return ShutdownReason::Terminate;
            }
            _ = worker.disconnected() => return ShutdownReason::ParentGone,
        }
    }
}
