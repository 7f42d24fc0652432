//! bf-agent: Worker-side agent for botfleet
//!
//! The agent runs inside each worker process. It wraps the bot client,
//! answers health checks from the orchestrator over stdin/stdout and
//! announces readiness once it is wired up.

pub mod agent;
pub mod chaos;
pub mod client;
pub mod runtime;

pub use agent::BotWorker;
pub use chaos::ChaosConfig;
pub use client::IdleBotClient;
pub use runtime::run_worker;
