//! Stand-in bot client

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bf_core::traits::BotClient;
use bf_core::types::ReplicaId;

/// A bot that does nothing but stay up
///
/// Reports healthy until stopped. Used when no real bot logic is linked in,
/// and by the integration tests.
#[derive(Debug)]
pub struct IdleBotClient {
    replica_id: ReplicaId,
    stopped: AtomicBool,
}

impl IdleBotClient {
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            replica_id,
            stopped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl BotClient for IdleBotClient {
    async fn start(&self) -> anyhow::Result<()> {
        tracing::info!(replica_id = %self.replica_id, "Idle bot started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            tracing::info!(replica_id = %self.replica_id, "Idle bot stopped");
        }
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}
