//! Orchestrator configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_millis;
use crate::error::ConfigError;
use crate::types::SensitiveString;

/// Configuration for the orchestrator daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Service identity; only replicas tagged with this name are managed
    pub service_name: String,

    /// How often desired state is re-fetched
    #[serde(rename = "reload_interval_ms", with = "duration_millis")]
    pub reload_interval: Duration,

    /// How often a fleet status summary is logged
    #[serde(rename = "status_report_interval_ms", with = "duration_millis")]
    pub status_report_interval: Duration,

    pub supervisor: SupervisorConfig,
    pub api: ApiConfig,
    pub source: SourceConfig,
    pub worker: WorkerConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            service_name: "botfleet".to_string(),
            reload_interval: Duration::from_secs(5 * 60),
            status_report_interval: Duration::from_secs(60),
            supervisor: SupervisorConfig::default(),
            api: ApiConfig::default(),
            source: SourceConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl FleetConfig {
    /// Check the configuration for values the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::MissingField("service_name".to_string()));
        }

        for (name, value) in [
            ("reload_interval_ms", self.reload_interval),
            ("status_report_interval_ms", self.status_report_interval),
            (
                "supervisor.health_check_timeout_ms",
                self.supervisor.health_check_timeout,
            ),
            (
                "supervisor.health_check_interval_ms",
                self.supervisor.health_check_interval,
            ),
            ("source.request_timeout_ms", self.source.request_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }

        if self.supervisor.max_failed_start_attempts == 0 {
            return Err(ConfigError::Invalid(
                "supervisor.max_failed_start_attempts must be at least 1".to_string(),
            ));
        }

        if self.source.page_size == 0 {
            return Err(ConfigError::Invalid(
                "source.page_size must be greater than 0".to_string(),
            ));
        }

        if self.source.replicas_file.is_none() {
            if self.source.base_url.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingField(
                    "source.base_url (or source.replicas_file)".to_string(),
                ));
            }
            if self.source.api_key.as_ref().map_or(true, |k| k.is_empty()) {
                return Err(ConfigError::MissingField("source.api_key".to_string()));
            }
        }

        Ok(())
    }
}

/// Per-bot supervision and process host timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Bound on the readiness wait and on each health probe
    #[serde(rename = "health_check_timeout_ms", with = "duration_millis")]
    pub health_check_timeout: Duration,

    /// Period of health probes, also the delay before a restart
    #[serde(rename = "health_check_interval_ms", with = "duration_millis")]
    pub health_check_interval: Duration,

    /// How long a worker gets to exit after SIGTERM before SIGKILL
    #[serde(rename = "graceful_shutdown_timeout_ms", with = "duration_millis")]
    pub graceful_shutdown_timeout: Duration,

    /// Consecutive failures before a bot is marked failed
    pub max_failed_start_attempts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_check_timeout: Duration::from_millis(1000),
            health_check_interval: Duration::from_millis(5000),
            graceful_shutdown_timeout: Duration::from_millis(1000),
            max_failed_start_attempts: 3,
        }
    }
}

/// HTTP surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind the HTTP server to
    pub bind_address: String,

    /// Bearer token required on `/bots` routes
    pub auth_token: Option<SensitiveString>,

    /// Re-read the remote source before applying CRUD mutations
    pub verify_with_source: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            auth_token: None,
            verify_with_source: true,
        }
    }
}

/// Where desired state comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the remote replicas API
    pub base_url: Option<String>,

    /// Organization secret for the remote API
    pub api_key: Option<SensitiveString>,

    /// Integration filter passed to the listing endpoint
    pub integration: String,

    /// Page size for listing
    pub page_size: u32,

    #[serde(rename = "request_timeout_ms", with = "duration_millis")]
    pub request_timeout: Duration,

    /// JSON file of replica records used instead of the remote API
    pub replicas_file: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            integration: "telegram".to_string(),
            page_size: 100,
            request_timeout: Duration::from_secs(30),
            replicas_file: None,
        }
    }
}

/// Worker process command
///
/// When `program` is unset the orchestrator re-executes itself with the
/// `worker` subcommand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    /// Extra environment passed to every worker
    pub env: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_source() -> FleetConfig {
        let mut config = FleetConfig::default();
        config.source.base_url = Some("https://api.example.com".to_string());
        config.source.api_key = Some("key".into());
        config
    }

    #[test]
    fn test_defaults() {
        let config = FleetConfig::default();
        assert_eq!(config.reload_interval, Duration::from_secs(300));
        assert_eq!(config.status_report_interval, Duration::from_secs(60));
        assert_eq!(config.supervisor.health_check_timeout, Duration::from_secs(1));
        assert_eq!(config.supervisor.health_check_interval, Duration::from_secs(5));
        assert_eq!(config.supervisor.max_failed_start_attempts, 3);
        assert_eq!(config.api.bind_address, "0.0.0.0:3000");
        assert!(config.api.verify_with_source);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: FleetConfig = toml::from_str(
            r#"
            service_name = "fleet-b"
            reload_interval_ms = 10000

            [supervisor]
            health_check_interval_ms = 250

            [worker]
            program = "/usr/local/bin/my-bot"
            args = ["--quiet"]
            env = { NODE_ENV = "production" }
            "#,
        )
        .unwrap();

        assert_eq!(config.service_name, "fleet-b");
        assert_eq!(config.reload_interval, Duration::from_secs(10));
        assert_eq!(config.supervisor.health_check_interval, Duration::from_millis(250));
        assert_eq!(config.supervisor.health_check_timeout, Duration::from_secs(1));
        assert_eq!(config.worker.args, vec!["--quiet".to_string()]);
        assert_eq!(config.worker.env["NODE_ENV"], "production");
    }

    #[test]
    fn test_validate_requires_a_source() {
        let err = FleetConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));

        let mut config = FleetConfig::default();
        config.source.replicas_file = Some(PathBuf::from("replicas.json"));
        config.validate().unwrap();

        with_source().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = with_source();
        config.supervisor.max_failed_start_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = with_source();
        config.reload_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
