//! End-to-end tests against real `bf-orchestrator worker` processes

use std::sync::Arc;
use std::time::{Duration, Instant};

use bf_core::config::{FleetConfig, SupervisorConfig};
use bf_core::error::HostError;
use bf_core::traits::WorkerHost;
use bf_core::types::{BotDefinition, BotStatus};
use bf_orchestrator::{Coordinator, ProcessHost, ProcessLauncher, StaticReplicaSource, WorkerCommand};

fn worker_command(chaos: Option<&str>) -> WorkerCommand {
    let command = WorkerCommand::new(env!("CARGO_BIN_EXE_bf-orchestrator"))
        .arg("worker")
        .env("LOG_LEVEL", "warn");
    match chaos {
        Some(chaos) => command.env("BOT_CHAOS", chaos),
        None => command,
    }
}

fn config() -> SupervisorConfig {
    SupervisorConfig {
        health_check_timeout: Duration::from_secs(5),
        health_check_interval: Duration::from_millis(500),
        graceful_shutdown_timeout: Duration::from_millis(500),
        max_failed_start_attempts: 3,
    }
}

fn bot(id: &str) -> BotDefinition {
    BotDefinition::new(id, "owner-1", format!("token-{id}")).with_slug(id)
}

#[tokio::test]
async fn test_worker_becomes_ready_and_healthy() {
    let host = ProcessHost::spawn(&bot("r-1"), &worker_command(None), &config())
        .await
        .unwrap();

    assert!(host.pid().is_some());
    assert!(host.is_connected());
    assert!(host.check_health().await);

    host.stop().await;
    assert!(host.has_exited());
    assert!(host.pid().is_none());
    assert!(!host.is_connected());

    // Second stop is a no-op
    host.stop().await;
}

#[tokio::test]
async fn test_worker_that_never_reports_ready_is_killed() {
    let mut config = config();
    config.health_check_timeout = Duration::from_millis(500);

    let started = Instant::now();
    let result = ProcessHost::spawn(&bot("r-2"), &worker_command(Some("skip-ready")), &config).await;

    match result {
        Err(HostError::NotReady { replica_id, source }) => {
            assert_eq!(replica_id.as_str(), "r-2");
            assert!(source.is_timeout());
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("worker should not have been ready"),
    }
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn test_unhealthy_worker_reports_false() {
    let host = ProcessHost::spawn(&bot("r-3"), &worker_command(Some("unhealthy")), &config())
        .await
        .unwrap();

    assert!(host.is_connected());
    assert!(!host.check_health().await);
    host.stop().await;
}

#[tokio::test]
async fn test_stubborn_worker_is_force_killed() {
    let config = config();
    let host = ProcessHost::spawn(&bot("r-4"), &worker_command(Some("ignore-terminate")), &config)
        .await
        .unwrap();

    let started = Instant::now();
    host.stop().await;
    let elapsed = started.elapsed();

    assert!(host.has_exited());
    assert!(elapsed >= config.graceful_shutdown_timeout);
    assert!(elapsed < config.graceful_shutdown_timeout * 2 + Duration::from_secs(2));
}

#[tokio::test]
async fn test_fleet_of_real_workers() {
    let source = StaticReplicaSource::new(vec![bot("a"), bot("b"), bot("c")]);
    let launcher = ProcessLauncher::new(worker_command(None));
    let fleet_config = FleetConfig {
        supervisor: config(),
        ..FleetConfig::default()
    };
    let coordinator = Coordinator::new(&fleet_config, Arc::new(source), Arc::new(launcher));

    coordinator.reconcile().await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    while !coordinator.is_healthy().await {
        assert!(Instant::now() < deadline, "fleet never became healthy");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let statuses = coordinator.get_status().await;
    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|s| s.status == BotStatus::Running));
    let mut pids: Vec<u32> = statuses.iter().filter_map(|s| s.pid).collect();
    pids.sort_unstable();
    pids.dedup();
    assert_eq!(pids.len(), 3);

    coordinator.shutdown().await;
    assert!(coordinator.get_status().await.is_empty());
}
