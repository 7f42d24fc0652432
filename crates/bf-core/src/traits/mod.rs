//! Core trait definitions

mod bot;
mod host;
mod source;

pub use bot::BotClient;
pub use host::{HostLauncher, WorkerHost};
pub use source::ReplicaSource;
