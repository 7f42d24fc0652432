//! HTTP client for the orchestrator API
//!
//! `/bots` requests carry the bearer token when one is configured. Error
//! bodies of the form `{"error": ".."}` are surfaced in the returned error.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Response, StatusCode};

use bf_core::api::{ErrorResponse, HealthResponse, UpdateBotRequest};
use bf_core::types::{BotDefinition, BotOperationResult, BotStatusInfo};

/// Default orchestrator address
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

/// Client for a running orchestrator
pub struct OrchestratorClient {
    http: reqwest::Client,
    server: String,
    token: Option<String>,
}

impl OrchestratorClient {
    /// Create a client for `server`, e.g. `http://127.0.0.1:3000`
    pub fn new(server: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            server: server.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request.send().await.with_context(|| {
            format!(
                "Failed to reach orchestrator at {}. Is it running?",
                self.server
            )
        })
    }

    /// Status of every supervised bot
    pub async fn status(&self) -> Result<Vec<BotStatusInfo>> {
        let response = self.send(self.http.get(self.url("/status"))).await?;
        let response = ensure_success(response).await?;
        response.json().await.context("Invalid status response")
    }

    /// Fleet health; an unhealthy fleet is not an error
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.send(self.http.get(self.url("/health"))).await?;
        if response.status() != StatusCode::SERVICE_UNAVAILABLE {
            return ensure_success(response)
                .await?
                .json()
                .await
                .context("Invalid health response");
        }
        response.json().await.context("Invalid health response")
    }

    /// Create (or replace) a bot
    pub async fn create(&self, definition: &BotDefinition) -> Result<()> {
        let request = self.authorized(self.http.post(self.url("/bots")).json(definition));
        ensure_success(self.send(request).await?).await?;
        Ok(())
    }

    /// Apply a partial update; returns whether the bot was created or updated
    pub async fn update(&self, replica_id: &str, body: &UpdateBotRequest) -> Result<BotOperationResult> {
        let request = self.authorized(
            self.http
                .put(self.url(&format!("/bots/{}", replica_id)))
                .json(body),
        );
        let response = ensure_success(self.send(request).await?).await?;
        Ok(match response.status() {
            StatusCode::CREATED => BotOperationResult::Created,
            _ => BotOperationResult::Updated,
        })
    }

    /// Stop and remove a bot
    pub async fn delete(&self, replica_id: &str) -> Result<()> {
        let request = self.authorized(self.http.delete(self.url(&format!("/bots/{}", replica_id))));
        ensure_success(self.send(request).await?).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or(text);
    match status {
        StatusCode::UNAUTHORIZED => anyhow::bail!("Unauthorized: {} (check --auth-token)", message),
        _ => anyhow::bail!("Orchestrator returned {}: {}", status, message),
    }
}
