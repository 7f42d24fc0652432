//! bf-core: Core abstractions and configuration for botfleet
//!
//! This crate provides shared types, traits, error types and configuration
//! structures used by the orchestrator, the worker agent and the CLI.

pub mod api;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;
pub mod worker_env;

pub use types::{
    BotDefinition, BotDefinitionPatch, BotOperationResult, BotStatus, BotStatusInfo, ReplicaId,
    SensitiveString,
};
pub use worker_env::WorkerEnv;
