//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Unique identifier for a replica (one bot identity)
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct ReplicaId(pub String);

impl ReplicaId {
    /// Create a new replica ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReplicaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReplicaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A secret string that never shows up in `Debug` or `Display` output
///
/// Serialization writes the real value, so keep it out of log fields rather
/// than out of request bodies.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct SensitiveString(String);

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Reveal the secret
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

impl fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

impl From<String> for SensitiveString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SensitiveString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Desired configuration of one bot instance
///
/// Values are never patched in place; an update produces a new definition
/// and the running instance is rebuilt if the value changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BotDefinition {
    pub replica_id: ReplicaId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_slug: Option<String>,
    pub owner_id: String,
    pub token: SensitiveString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl BotDefinition {
    pub fn new(
        replica_id: impl Into<ReplicaId>,
        owner_id: impl Into<String>,
        token: impl Into<SensitiveString>,
    ) -> Self {
        Self {
            replica_id: replica_id.into(),
            replica_slug: None,
            owner_id: owner_id.into(),
            token: token.into(),
            voice_id: None,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.replica_slug = Some(slug.into());
        self
    }

    pub fn with_voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }
}

/// Partial update for a bot; unset fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotDefinitionPatch {
    pub replica_id: ReplicaId,
    pub replica_slug: Option<String>,
    pub owner_id: Option<String>,
    pub token: Option<SensitiveString>,
    pub voice_id: Option<String>,
}

impl BotDefinitionPatch {
    /// Empty patch for the given replica
    pub fn for_replica(replica_id: impl Into<ReplicaId>) -> Self {
        Self {
            replica_id: replica_id.into(),
            ..Default::default()
        }
    }

    /// Merge onto `existing`, falling back to its values for unset fields
    ///
    /// Returns `None` when no token or owner can be resolved.
    pub fn merge(self, existing: Option<&BotDefinition>) -> Option<BotDefinition> {
        let token = self.token.or_else(|| existing.map(|d| d.token.clone()))?;
        let owner_id = self.owner_id.or_else(|| existing.map(|d| d.owner_id.clone()))?;
        Some(BotDefinition {
            replica_id: self.replica_id,
            replica_slug: self
                .replica_slug
                .or_else(|| existing.and_then(|d| d.replica_slug.clone())),
            owner_id,
            token,
            voice_id: self
                .voice_id
                .or_else(|| existing.and_then(|d| d.voice_id.clone())),
        })
    }
}

impl From<BotDefinition> for BotDefinitionPatch {
    fn from(definition: BotDefinition) -> Self {
        Self {
            replica_id: definition.replica_id,
            replica_slug: definition.replica_slug,
            owner_id: Some(definition.owner_id),
            token: Some(definition.token),
            voice_id: definition.voice_id,
        }
    }
}

/// Observed status of one bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    /// Healthy with no recent failures
    Running,
    /// Connected but failing health checks
    Unhealthy,
    /// No connected worker process
    Stopped,
    /// Healthy again after recent failures
    Restarting,
    /// Gave up after exhausting the attempt budget
    Failed,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotStatus::Running => write!(f, "running"),
            BotStatus::Unhealthy => write!(f, "unhealthy"),
            BotStatus::Stopped => write!(f, "stopped"),
            BotStatus::Restarting => write!(f, "restarting"),
            BotStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Read-only status snapshot of one bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BotStatusInfo {
    pub replica_id: ReplicaId,
    pub slug: Option<String>,
    pub owner_id: String,
    pub status: BotStatus,
    pub pid: Option<u32>,
}

impl BotStatusInfo {
    /// Snapshot for a definition with the given status and no process
    pub fn for_definition(definition: &BotDefinition, status: BotStatus) -> Self {
        Self {
            replica_id: definition.replica_id.clone(),
            slug: definition.replica_slug.clone(),
            owner_id: definition.owner_id.clone(),
            status,
            pid: None,
        }
    }
}

/// Outcome of a coordinator CRUD operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotOperationResult {
    Created,
    Updated,
    Deleted,
    NotFound,
}
