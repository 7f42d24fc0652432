//! Worker-side agent wrapping a bot client

use std::sync::Arc;

use bf_core::traits::BotClient;
use bf_protocol::{HealthCheck, HealthReport, IpcChannel, IpcError};

use crate::chaos::ChaosConfig;

/// Connects a [`BotClient`] to the orchestrator's IPC channel
pub struct BotWorker<C: BotClient> {
    client: Arc<C>,
    channel: IpcChannel,
    chaos: ChaosConfig,
}

impl<C: BotClient> BotWorker<C> {
    pub fn new(client: Arc<C>, channel: IpcChannel, chaos: ChaosConfig) -> Self {
        Self {
            client,
            channel,
            chaos,
        }
    }

    /// Register the health-check handler, then send `READY`
    ///
    /// Must run before the bot client is started so the orchestrator can
    /// probe the worker as soon as it sees readiness.
    pub fn announce(&self) -> Result<(), IpcError> {
        let client = Arc::clone(&self.client);
        let chaos = self.chaos.clone();
        self.channel.on_request::<HealthCheck, _>(move |_, responder| {
            let client = Arc::clone(&client);
            let forced = chaos.forced_health();
            tokio::spawn(async move {
                let is_healthy = match forced {
                    Some(verdict) => verdict,
                    None => client.is_healthy().await,
                };
                tracing::trace!(id = %responder.id(), is_healthy, "Answering health check");
                if let Err(e) = responder.send(HealthReport { is_healthy }) {
                    tracing::debug!(error = %e, "Could not answer health check");
                }
            });
        });

        if self.chaos.skip_ready {
            tracing::warn!("Chaos: not announcing readiness");
            return Ok(());
        }
        self.channel.send_ready()
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.client.start().await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.client.stop().await
    }

    /// Resolve once the orchestrator's end of the channel is gone
    pub async fn disconnected(&self) {
        self.channel.closed().await
    }
}
