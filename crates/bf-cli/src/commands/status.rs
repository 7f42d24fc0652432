//! Status command implementation

use anyhow::Result;

use crate::client::OrchestratorClient;
use crate::output::{format_statuses, print_error};

/// Execute the status command
pub async fn status_command(client: &OrchestratorClient, json: bool) -> Result<()> {
    let statuses = match client.status().await {
        Ok(s) => s,
        Err(e) => {
            print_error(&format!("Failed to get fleet status: {:#}", e));
            return Err(e);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        println!("{}", format_statuses(&statuses));
    }

    Ok(())
}
