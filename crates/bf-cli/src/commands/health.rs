//! Health command implementation

use anyhow::Result;
use bf_core::api::FleetHealth;

use crate::client::OrchestratorClient;
use crate::output::{format_health, print_error};

/// Execute the health command; an unhealthy fleet is an error
pub async fn health_command(client: &OrchestratorClient) -> Result<()> {
    let health = match client.health().await {
        Ok(h) => h,
        Err(e) => {
            print_error(&format!("Failed to get fleet health: {:#}", e));
            return Err(e);
        }
    };

    println!("{}", format_health(&health));

    if health.status == FleetHealth::Unhealthy {
        anyhow::bail!("Fleet is unhealthy");
    }
    Ok(())
}
