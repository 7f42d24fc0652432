//! botfleet CLI
//!
//! Inspect and manage a running botfleet orchestrator.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::stdin;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bf_core::api::UpdateBotRequest;
use bf_core::types::BotDefinition;
use botfleet::client::{OrchestratorClient, DEFAULT_SERVER};
use botfleet::commands::{self, BOT_TOKEN_ENV};

#[derive(Parser)]
#[command(name = "botfleet")]
#[command(author, version, about = "Manage a fleet of supervised bots")]
#[command(propagate_version = true)]
struct Cli {
    /// Orchestrator base URL
    #[arg(short, long, global = true, env = "BOTFLEET_SERVER", default_value = DEFAULT_SERVER)]
    server: String,

    /// Bearer token for bot mutations
    #[arg(long, global = true, env = "ORCHESTRATOR_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the status of every bot
    Status {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Show fleet health; exits non-zero when unhealthy
    Health,

    /// Create a bot, replacing any existing one with the same replica ID
    ///
    /// The integration token is read from BOTFLEET_BOT_TOKEN, or from stdin
    /// with --token-stdin, so it never shows up in the process list.
    Add {
        #[arg(long)]
        replica_id: String,
        #[arg(long)]
        owner_id: String,
        /// Read the integration token from the first line of stdin
        #[arg(long)]
        token_stdin: bool,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        voice_id: Option<String>,
    },

    /// Change fields of a bot; unset fields keep their value
    Update {
        replica_id: String,
        #[arg(long)]
        owner_id: Option<String>,
        /// Replace the integration token with the first line of stdin
        #[arg(long)]
        token_stdin: bool,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        voice_id: Option<String>,
    },

    /// Stop and remove a bot
    Delete { replica_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let client = OrchestratorClient::new(cli.server, cli.auth_token)?;
    tracing::debug!("Using orchestrator at {}", client.server());

    match cli.command {
        Commands::Status { json } => commands::status_command(&client, json).await,
        Commands::Health => commands::health_command(&client).await,
        Commands::Add {
            replica_id,
            owner_id,
            token_stdin,
            slug,
            voice_id,
        } => {
            let token = commands::read_token(
                token_stdin,
                std::env::var(BOT_TOKEN_ENV).ok(),
                stdin().lock(),
            )?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "A bot token is required: pipe it with --token-stdin or set {}",
                    BOT_TOKEN_ENV
                )
            })?;
            let mut definition = BotDefinition::new(replica_id, owner_id, token);
            definition.replica_slug = slug;
            definition.voice_id = voice_id;
            commands::add_command(&client, definition).await
        }
        Commands::Update {
            replica_id,
            owner_id,
            token_stdin,
            slug,
            voice_id,
        } => {
            let body = UpdateBotRequest {
                replica_slug: slug,
                owner_id,
                token: commands::read_token(token_stdin, None, stdin().lock())?,
                voice_id,
            };
            commands::update_command(&client, &replica_id, body).await
        }
        Commands::Delete { replica_id } => commands::delete_command(&client, &replica_id).await,
    }
}
