//! Desired-state sources
//!
//! [`ReplicaApiClient`] pages through the remote replica API and keeps the
//! replicas that carry an integration token for this service.
//! [`StaticReplicaSource`] serves a fixed fleet, optionally re-read from a
//! JSON file on every call.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use bf_core::config::SourceConfig;
use bf_core::error::SourceError;
use bf_core::traits::ReplicaSource;
use bf_core::types::{BotDefinition, ReplicaId, SensitiveString};

const API_VERSION: &str = "2025-02-01";
const USER_AGENT: &str = "botfleet-orchestrator";

/// Upper bound on pages per listing
const MAX_PAGES: usize = 1_000;

/// One replica as returned by the remote API
#[derive(Debug, Clone, Deserialize)]
struct ReplicaRecord {
    uuid: String,
    #[serde(default)]
    slug: Option<String>,
    owner_uuid: String,
    #[serde(default)]
    telegram_integration: Option<IntegrationRecord>,
    #[serde(default)]
    elevenlabs_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IntegrationRecord {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    service_name: Option<String>,
}

impl ReplicaRecord {
    /// Definition for this record, if it belongs to `service_name`
    ///
    /// Records without a token are skipped, as are records tagged for a
    /// different service. Untagged records are accepted.
    fn into_definition(self, service_name: &str) -> Option<BotDefinition> {
        let integration = self.telegram_integration?;
        if let Some(tag) = integration.service_name.as_deref() {
            if tag != service_name {
                return None;
            }
        }
        let token = integration.token.filter(|t| !t.is_empty())?;

        Some(BotDefinition {
            replica_id: ReplicaId::new(self.uuid),
            replica_slug: self.slug.filter(|s| !s.is_empty()),
            owner_id: self.owner_uuid,
            token: SensitiveString::new(token),
            voice_id: self.elevenlabs_id.filter(|v| !v.is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    items: Vec<ReplicaRecord>,
    #[serde(default)]
    total: Option<usize>,
}

/// Client for the remote replica API
pub struct ReplicaApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SensitiveString,
    integration: String,
    page_size: u32,
    service_name: String,
}

impl ReplicaApiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SensitiveString,
        config: &SourceConfig,
        service_name: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            integration: config.integration.clone(),
            page_size: config.page_size,
            service_name: service_name.into(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .header("X-Organization-Secret", self.api_key.expose())
            .header("X-API-Version", API_VERSION)
            .header("Accept", "application/json")
    }

    async fn fetch_page(&self, page: usize) -> Result<ListPage, SourceError> {
        let response = self
            .get("/v1/replicas")
            .query(&[
                ("integration", self.integration.clone()),
                ("page", page.to_string()),
                ("page_size", self.page_size.to_string()),
            ])
            .send()
            .await?;

        let body = read_success(response).await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl ReplicaSource for ReplicaApiClient {
    async fn list_bots(&self) -> Result<Vec<BotDefinition>, SourceError> {
        let mut bots = Vec::new();
        let mut seen = 0usize;
        let mut page = 1usize;
        let mut previous: Vec<String> = Vec::new();

        loop {
            let ListPage { items, total } = self.fetch_page(page).await?;
            if items.is_empty() {
                break;
            }

            let ids: Vec<String> = items.iter().map(|r| r.uuid.clone()).collect();
            if ids == previous {
                tracing::warn!(page, "Replica API returned the same page twice, stopping");
                break;
            }
            let short = items.len() < self.page_size as usize;

            seen += items.len();
            bots.extend(
                items
                    .into_iter()
                    .filter_map(|r| r.into_definition(&self.service_name)),
            );
            match total {
                Some(total) if seen >= total => break,
                None if short => break,
                _ => {}
            }
            if page >= MAX_PAGES {
                tracing::warn!(page, seen, "Replica listing hit the page limit, stopping");
                break;
            }
            previous = ids;
            page += 1;
        }

        tracing::debug!(pages = page, seen, kept = bots.len(), "Fetched replicas");
        Ok(bots)
    }

    async fn get_bot(&self, replica_id: &ReplicaId) -> Result<Option<BotDefinition>, SourceError> {
        let response = self
            .get(&format!("/v1/replicas/{}", replica_id))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = read_success(response).await?;
        let record: ReplicaRecord = serde_json::from_value(body)?;
        Ok(record.into_definition(&self.service_name))
    }
}

/// Read a JSON body, mapping error statuses and `success: false` to errors
async fn read_success(response: reqwest::Response) -> Result<Value, SourceError> {
    let status = response.status();
    let text = response.text().await?;
    let body = serde_json::from_str::<Value>(&text);

    let api_error = body.as_ref().ok().and_then(|b| {
        (b.get("success") == Some(&Value::Bool(false))).then(|| SourceError::Api {
            message: b["error"].as_str().unwrap_or("unknown error").to_string(),
            request_id: b["request_id"].as_str().map(str::to_string),
        })
    });

    if !status.is_success() {
        return Err(api_error.unwrap_or(SourceError::Status {
            status: status.as_u16(),
            message: text,
        }));
    }
    if let Some(err) = api_error {
        return Err(err);
    }

    Ok(body?)
}

/// Fixed fleet, optionally backed by a JSON file of bot definitions
pub struct StaticReplicaSource {
    path: Option<PathBuf>,
    bots: RwLock<Vec<BotDefinition>>,
}

impl StaticReplicaSource {
    pub fn new(bots: Vec<BotDefinition>) -> Self {
        Self {
            path: None,
            bots: RwLock::new(bots),
        }
    }

    /// Load a fleet file; the file is re-read on every listing
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let bots = read_fleet_file(&path)?;
        Ok(Self {
            path: Some(path),
            bots: RwLock::new(bots),
        })
    }

    fn snapshot(&self) -> Vec<BotDefinition> {
        match self.bots.read() {
            Ok(bots) => bots.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn refresh(&self) -> Result<(), SourceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bots = read_fleet_file(path)?;
        match self.bots.write() {
            Ok(mut current) => *current = bots,
            Err(poisoned) => *poisoned.into_inner() = bots,
        }
        Ok(())
    }
}

fn read_fleet_file(path: &Path) -> Result<Vec<BotDefinition>, SourceError> {
    let content = std::fs::read_to_string(path).map_err(|source| SourceError::File {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

#[async_trait]
impl ReplicaSource for StaticReplicaSource {
    async fn list_bots(&self) -> Result<Vec<BotDefinition>, SourceError> {
        self.refresh()?;
        Ok(self.snapshot())
    }

    async fn get_bot(&self, replica_id: &ReplicaId) -> Result<Option<BotDefinition>, SourceError> {
        self.refresh()?;
        Ok(self
            .snapshot()
            .into_iter()
            .find(|b| &b.replica_id == replica_id))
    }
}
