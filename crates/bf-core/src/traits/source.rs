//! Desired-state source trait

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::{BotDefinition, ReplicaId};

/// Source of truth for which bots should run
#[async_trait]
pub trait ReplicaSource: Send + Sync + 'static {
    /// Every bot this service should run
    async fn list_bots(&self) -> Result<Vec<BotDefinition>, SourceError>;

    /// Current definition of one bot, or `None` if the source has no such bot
    async fn get_bot(&self, replica_id: &ReplicaId) -> Result<Option<BotDefinition>, SourceError>;
}
