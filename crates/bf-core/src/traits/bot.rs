//! Bot client contract

use async_trait::async_trait;

/// The bot logic running inside a worker process
///
/// The worker agent only starts, stops and probes it.
#[async_trait]
pub trait BotClient: Send + Sync + 'static {
    /// Start the bot's own event loop
    async fn start(&self) -> anyhow::Result<()>;

    /// Stop the bot and release its resources
    async fn stop(&self) -> anyhow::Result<()>;

    /// Whether the bot considers itself healthy
    async fn is_healthy(&self) -> bool;
}
