//! Worker process host traits

use async_trait::async_trait;

use crate::config::SupervisorConfig;
use crate::error::HostError;
use crate::types::BotDefinition;

/// One running worker process as seen by its supervisor
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// OS process ID, if the process is still known
    fn pid(&self) -> Option<u32>;

    /// Whether the IPC channel to the worker is still up
    fn is_connected(&self) -> bool;

    /// Probe the worker; a timeout or transport failure is `false`
    async fn check_health(&self) -> bool;

    /// Resolve once the worker has exited or its channel dropped
    async fn closed(&self);

    /// Two-phase shutdown; safe to call more than once
    async fn stop(&self);
}

/// Starts worker processes for bot definitions
#[async_trait]
pub trait HostLauncher: Send + Sync + 'static {
    /// Start a worker and wait until it reports ready
    async fn launch(
        &self,
        definition: &BotDefinition,
        config: &SupervisorConfig,
    ) -> Result<Box<dyn WorkerHost>, HostError>;
}
