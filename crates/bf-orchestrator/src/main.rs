//! botfleet orchestrator daemon
//!
//! `run` supervises the fleet and serves the HTTP API. `worker` is the
//! process the orchestrator spawns for each bot; it speaks the IPC protocol
//! over stdin/stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bf_agent::runtime::ShutdownReason;
use bf_agent::{run_worker, IdleBotClient};
use bf_core::config::{self, FleetConfig};
use bf_core::traits::ReplicaSource;
use bf_core::types::SensitiveString;
use bf_core::WorkerEnv;
use bf_orchestrator::api::{self, AppState};
use bf_orchestrator::{
    Coordinator, ProcessLauncher, ReplicaApiClient, StaticReplicaSource, WorkerCommand,
};

#[derive(Parser)]
#[command(name = "bf-orchestrator")]
#[command(about = "botfleet orchestrator daemon")]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Supervise the fleet and serve the HTTP API
    Run(RunArgs),

    /// Run a single bot worker (spawned by the orchestrator)
    Worker,
}

#[derive(Args)]
struct RunArgs {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP bind address (overrides config)
    #[arg(short, long, env = "BOTFLEET_BIND")]
    bind: Option<String>,

    /// Service identity used to filter replicas
    #[arg(long, env = "SERVICE_NAME")]
    service_name: Option<String>,

    #[arg(long, env = "RELOAD_BOTS_INTERVAL_MS")]
    reload_interval_ms: Option<u64>,

    #[arg(long, env = "PRINT_BOTS_STATUS_INTERVAL_MS")]
    status_report_interval_ms: Option<u64>,

    #[arg(long, env = "HEALTH_CHECK_TIMEOUT_MS")]
    health_check_timeout_ms: Option<u64>,

    #[arg(long, env = "HEALTH_CHECK_INTERVAL_MS")]
    health_check_interval_ms: Option<u64>,

    #[arg(long, env = "GRACEFUL_SHUTDOWN_TIMEOUT_MS")]
    graceful_shutdown_timeout_ms: Option<u64>,

    #[arg(long, env = "MAX_FAILED_START_ATTEMPTS")]
    max_failed_start_attempts: Option<u32>,

    /// Bearer token required on /bots routes
    #[arg(long, env = "ORCHESTRATOR_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Remote replica API base URL
    #[arg(long, env = "SENSAY_API_URL")]
    api_url: Option<String>,

    /// Remote replica API key
    #[arg(long, env = "SENSAY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Serve a static fleet from a JSON file instead of the remote API
    #[arg(long, env = "BOTFLEET_REPLICAS_FILE")]
    replicas_file: Option<PathBuf>,
}

impl RunArgs {
    /// Apply flag and environment overrides on top of the file config
    fn apply(&self, config: &mut FleetConfig) {
        let millis = Duration::from_millis;

        if let Some(bind) = &self.bind {
            config.api.bind_address = bind.clone();
        }
        if let Some(name) = &self.service_name {
            config.service_name = name.clone();
        }
        if let Some(ms) = self.reload_interval_ms {
            config.reload_interval = millis(ms);
        }
        if let Some(ms) = self.status_report_interval_ms {
            config.status_report_interval = millis(ms);
        }
        if let Some(ms) = self.health_check_timeout_ms {
            config.supervisor.health_check_timeout = millis(ms);
        }
        if let Some(ms) = self.health_check_interval_ms {
            config.supervisor.health_check_interval = millis(ms);
        }
        if let Some(ms) = self.graceful_shutdown_timeout_ms {
            config.supervisor.graceful_shutdown_timeout = millis(ms);
        }
        if let Some(attempts) = self.max_failed_start_attempts {
            config.supervisor.max_failed_start_attempts = attempts;
        }
        if let Some(token) = &self.auth_token {
            config.api.auth_token = Some(SensitiveString::new(token.clone()));
        }
        if let Some(url) = &self.api_url {
            config.source.base_url = Some(url.clone());
        }
        if let Some(key) = &self.api_key {
            config.source.api_key = Some(SensitiveString::new(key.clone()));
        }
        if let Some(path) = &self.replicas_file {
            config.source.replicas_file = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            init_logging(&cli.log_level, false);
            run(args).await
        }
        Command::Worker => {
            let code = match worker(&cli.log_level).await {
                Ok(reason) => {
                    tracing::debug!(?reason, "Worker exited");
                    0
                }
                Err(e) => {
                    tracing::error!("Worker failed: {:#}", e);
                    1
                }
            };
            // stdin is read on a blocking thread that would keep the runtime alive
            std::process::exit(code);
        }
    }
}

fn init_logging(log_level: &str, to_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    // stdout belongs to the IPC transport inside a worker
    if to_stderr {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn worker(default_level: &str) -> Result<ShutdownReason> {
    let env = WorkerEnv::from_env();
    let log_level = env
        .as_ref()
        .ok()
        .and_then(|e| e.log_level.clone())
        .unwrap_or_else(|| default_level.to_string());
    init_logging(&log_level, true);

    let env = env.context("Invalid worker environment")?;
    let client = Arc::new(IdleBotClient::new(env.replica_id.clone()));
    run_worker(env, client).await
}

fn load_config(path: Option<&PathBuf>) -> Result<FleetConfig> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            FleetConfig::default()
        }))
    } else {
        tracing::info!("Using default configuration");
        Ok(FleetConfig::default())
    }
}

fn build_source(config: &FleetConfig) -> Result<Arc<dyn ReplicaSource>> {
    if let Some(path) = &config.source.replicas_file {
        tracing::info!("Serving static fleet from {:?}", path);
        let source = StaticReplicaSource::from_file(path)?;
        return Ok(Arc::new(source));
    }

    let base_url = config
        .source
        .base_url
        .clone()
        .context("source.base_url is not set")?;
    let api_key = config
        .source
        .api_key
        .clone()
        .context("source.api_key is not set")?;
    tracing::info!(%base_url, service = %config.service_name, "Using remote replica API");

    let client = ReplicaApiClient::new(base_url, api_key, &config.source, &config.service_name)?;
    Ok(Arc::new(client))
}

async fn run(args: RunArgs) -> Result<()> {
    tracing::info!("botfleet orchestrator starting...");

    let mut config = load_config(args.config.as_ref())?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let source = build_source(&config)?;
    let command = WorkerCommand::from_config(&config.worker)
        .context("Failed to resolve worker executable")?;
    let launcher = Arc::new(ProcessLauncher::new(command));
    let coordinator = Arc::new(Coordinator::new(&config, source, launcher));

    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let listener = tokio::net::TcpListener::bind(&config.api.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.api.bind_address))?;
    let state = Arc::new(AppState::new(Arc::clone(&coordinator), &config.api));
    let server = tokio::spawn(api::serve(listener, state, cancel.clone()));

    let fleet = coordinator.start(cancel.clone()).await;

    fleet.await.context("Coordinator task panicked")?;
    server
        .await
        .context("HTTP server task panicked")?
        .context("HTTP server failed")?;

    tracing::info!("Orchestrator shutdown complete");
    Ok(())
}
