//! Bot create, update and delete commands

use std::io::BufRead;

use anyhow::{Context, Result};

use bf_core::api::UpdateBotRequest;
use bf_core::types::{BotDefinition, BotOperationResult, SensitiveString};

use crate::client::OrchestratorClient;
use crate::output::{print_error, print_success};

/// Environment variable holding the integration token for `add`
pub const BOT_TOKEN_ENV: &str = "BOTFLEET_BOT_TOKEN";

/// Resolve a bot's integration token without taking it from the command line
///
/// With `from_stdin` the first line of `stdin` is used; otherwise `env_value`.
/// Empty values count as absent.
pub fn read_token(
    from_stdin: bool,
    env_value: Option<String>,
    mut stdin: impl BufRead,
) -> Result<Option<SensitiveString>> {
    if !from_stdin {
        return Ok(env_value
            .filter(|t| !t.is_empty())
            .map(SensitiveString::new));
    }

    let mut line = String::new();
    stdin
        .read_line(&mut line)
        .context("Failed to read token from stdin")?;
    let token = line.trim();
    if token.is_empty() {
        anyhow::bail!("No token on stdin");
    }
    Ok(Some(SensitiveString::new(token)))
}

/// Execute the add command
pub async fn add_command(client: &OrchestratorClient, definition: BotDefinition) -> Result<()> {
    let replica_id = definition.replica_id.clone();
    match client.create(&definition).await {
        Ok(()) => {
            print_success(&format!("Bot {} created", replica_id));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to create bot {}: {:#}", replica_id, e));
            Err(e)
        }
    }
}

/// Execute the update command
pub async fn update_command(
    client: &OrchestratorClient,
    replica_id: &str,
    body: UpdateBotRequest,
) -> Result<()> {
    if body == UpdateBotRequest::default() {
        print_error("Nothing to update; pass at least one field");
        anyhow::bail!("Empty update");
    }

    match client.update(replica_id, &body).await {
        Ok(BotOperationResult::Created) => {
            print_success(&format!("Bot {} created", replica_id));
            Ok(())
        }
        Ok(_) => {
            print_success(&format!("Bot {} updated", replica_id));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to update bot {}: {:#}", replica_id, e));
            Err(e)
        }
    }
}

/// Execute the delete command
pub async fn delete_command(client: &OrchestratorClient, replica_id: &str) -> Result<()> {
    match client.delete(replica_id).await {
        Ok(()) => {
            print_success(&format!("Bot {} deleted", replica_id));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to delete bot {}: {:#}", replica_id, e));
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_token_from_stdin_first_line() {
        let token = read_token(true, Some("ignored".into()), Cursor::new("s3cret\nrest\n"))
            .unwrap()
            .unwrap();
        assert_eq!(token.expose(), "s3cret");
    }

    #[test]
    fn test_empty_stdin_is_an_error() {
        let err = read_token(true, None, Cursor::new("\n")).unwrap_err();
        assert!(err.to_string().contains("No token on stdin"));
    }

    #[test]
    fn test_token_from_env() {
        let token = read_token(false, Some("from-env".into()), Cursor::new(""))
            .unwrap()
            .unwrap();
        assert_eq!(token.expose(), "from-env");

        assert!(read_token(false, Some(String::new()), Cursor::new("")).unwrap().is_none());
        assert!(read_token(false, None, Cursor::new("unused")).unwrap().is_none());
    }
}
