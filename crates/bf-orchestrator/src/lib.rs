//! bf-orchestrator: Supervises a fleet of bot worker processes
//!
//! This crate provides:
//! - Process hosting: spawn a worker, wait for READY, probe health, stop it
//! - Per-bot supervision with bounded restarts
//! - Fleet coordination against a remote desired-state source
//! - The HTTP surface for status and CRUD

pub mod api;
pub mod coordinator;
pub mod host;
pub mod source;
pub mod supervisor;

#[cfg(test)]
mod test_support;

pub use coordinator::Coordinator;
pub use host::{ProcessHost, ProcessLauncher, WorkerCommand};
pub use source::{ReplicaApiClient, StaticReplicaSource};
pub use supervisor::SupervisorHandle;
