//! Request and response bodies of the orchestrator's HTTP surface

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::{BotDefinitionPatch, ReplicaId, SensitiveString};

/// Fleet-level health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FleetHealth {
    Healthy,
    Unhealthy,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: FleetHealth,
    /// Seconds since the orchestrator started
    pub uptime: u64,
}

/// Body of `PUT /bots/{replicaId}`; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBotRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SensitiveString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl UpdateBotRequest {
    /// Attach the replica ID from the request path
    pub fn into_patch(self, replica_id: ReplicaId) -> BotDefinitionPatch {
        BotDefinitionPatch {
            replica_id,
            replica_slug: self.replica_slug,
            owner_id: self.owner_id,
            token: self.token,
            voice_id: self.voice_id,
        }
    }
}

/// JSON error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
