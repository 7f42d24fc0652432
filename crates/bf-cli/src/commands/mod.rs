//! CLI command implementations

mod bots;
mod health;
mod status;

pub use bots::{add_command, delete_command, read_token, update_command, BOT_TOKEN_ENV};
pub use health::health_command;
pub use status::status_command;
