//! Core error types for botfleet

use bf_protocol::IpcError;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::ReplicaId;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Errors starting or talking to a worker process
#[derive(Error, Debug)]
pub enum HostError {
    /// The OS refused to spawn the process
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// A stdio pipe was not available after spawn
    #[error("Worker {0} pipe unavailable")]
    MissingPipe(&'static str),

    /// The worker never announced readiness
    #[error("Worker for {replica_id} not ready: {source}")]
    NotReady {
        replica_id: ReplicaId,
        #[source]
        source: IpcError,
    },
}

/// Errors reading the remote desired-state source
#[derive(Error, Debug)]
pub enum SourceError {
    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("Unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// The API answered with `success: false`
    #[error("Remote API error: {message}")]
    Api {
        message: String,
        request_id: Option<String>,
    },

    /// Local replicas file could not be read
    #[error("Failed to read replicas file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Response or file body could not be parsed
    #[error("Failed to parse replicas: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors from a supervisor handle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// The supervisor task has ended
    #[error("Supervisor for {0} is gone")]
    Gone(ReplicaId),
}

/// Errors from coordinator operations
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// The remote source could not be read
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The remote source disagrees with the requested change
    #[error("Out of sync with source for {replica_id}: {reason}")]
    OutOfSync { replica_id: ReplicaId, reason: String },
}

/// Errors validating the worker process environment
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WorkerEnvError {
    /// A required variable is missing or empty
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is present but unusable
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_error_messages() {
        let err = CoordinatorError::from(SourceError::Status {
            status: 503,
            message: "down".to_string(),
        });
        assert_eq!(err.to_string(), "Source error: Unexpected status 503: down");

        let err = CoordinatorError::OutOfSync {
            replica_id: ReplicaId::from("r-1"),
            reason: "token differs".to_string(),
        };
        assert_eq!(err.to_string(), "Out of sync with source for r-1: token differs");
    }

    #[test]
    fn test_not_ready_exposes_ipc_cause() {
        let err = HostError::NotReady {
            replica_id: ReplicaId::from("r-1"),
            source: IpcError::Disconnected,
        };
        let cause = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(cause, Some(IpcError::Disconnected.to_string()));
    }
}
