//! Integration tests for the sweep loop and service assembly

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mockall::mock;
use redress::{
    ActionRequest, Actor, EngineConfig, GrievanceStatus, ManualClock, NewGrievance, RetryReport,
    SharedClock, SweepReport,
};
use redress_scheduler::{assemble, SchedulerLoop, SweepTarget};

mock! {
    pub Target {}

    #[async_trait]
    impl SweepTarget for Target {
        async fn sweep(&self, now: DateTime<Utc>) -> SweepReport;
        async fn retry_side_effects(&self) -> RetryReport;
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

const HIERARCHY: &str = r#"
[[authorities]]
id = "L0"
name = "District Utilities Office"
level = 0
department_id = "DPT-UTIL"
parent_id = "L1"

[[authorities]]
id = "L1"
name = "State Utilities Board"
level = 1
department_id = "DPT-UTIL"

[[rules]]
id = "R-UTIL"
category = "Utilities"
department_id = "DPT-UTIL"
levels = ["L0", "L1"]
sla_days_per_level = [7, 14]
citizen_response_days = 5
"#;

/// Test: the loop sweeps on every tick and stops on cancel
#[tokio::test(start_paused = true)]
async fn test_loop_sweeps_each_interval_until_cancelled() {
    let mut target = MockTarget::new();
    target
        .expect_sweep()
        .times(3)
        .returning(|now| SweepReport::new(now));
    target
        .expect_retry_side_effects()
        .times(3)
        .returning(RetryReport::default);

    let clock: SharedClock = Arc::new(ManualClock::new(t0()));
    let scheduler = Arc::new(SchedulerLoop::new(
        Arc::new(target),
        clock,
        Duration::from_secs(60),
    ));
    let cancel = scheduler.cancel_token();

    let runner = scheduler.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    // Ticks at 0s, 60s and 120s
    tokio::time::sleep(Duration::from_secs(150)).await;
    cancel.cancel();

    let stats = handle.await.unwrap();
    assert_eq!(stats.sweeps, 3);
    assert_eq!(stats.transitions, 0);
}

/// Test: sweeps use the injected clock
#[tokio::test]
async fn test_run_once_passes_clock_time() {
    let mut target = MockTarget::new();
    target
        .expect_sweep()
        .withf(|now| *now == t0())
        .times(1)
        .returning(|now| SweepReport::new(now));
    target
        .expect_retry_side_effects()
        .times(1)
        .returning(RetryReport::default);

    let clock: SharedClock = Arc::new(ManualClock::new(t0()));
    let scheduler = SchedulerLoop::new(Arc::new(target), clock, Duration::from_secs(60));
    let (report, retry) = scheduler.run_once().await;
    assert_eq!(report.now, t0());
    assert_eq!(retry, RetryReport::default());
}

/// Test: assembly loads the hierarchy and serves requests
#[tokio::test]
async fn test_assemble_from_config_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hierarchy.toml"), HIERARCHY).unwrap();
    let config_path = dir.path().join("redress.toml");
    std::fs::write(
        &config_path,
        "hierarchy_path = \"hierarchy.toml\"\n\n[sweep]\ninterval_secs = 30\n",
    )
    .unwrap();

    let config = EngineConfig::load(&config_path).unwrap();
    let assembly = assemble(config).await.unwrap();
    let mut rx = assembly.bus.subscribe();

    let filing = NewGrievance::new("citizen-1", "Outage", "No power since noon")
        .with_category("Utilities", "DPT-UTIL");
    let g = assembly
        .service
        .file_grievance(filing, ActionRequest::new(Actor::citizen("citizen-1")))
        .await
        .unwrap();
    assert_eq!(g.status, GrievanceStatus::Submitted);
    assert_eq!(g.authority_id, "L0");

    let change = rx.recv().await.unwrap();
    assert_eq!(change.grievance_id, g.id);
}

/// Test: a missing hierarchy file is a configuration error
#[tokio::test]
async fn test_assemble_reports_missing_hierarchy() {
    let mut config = EngineConfig::default();
    config.hierarchy_path = "/nonexistent/hierarchy.toml".into();
    let err = assemble(config).await.err().unwrap();
    assert!(matches!(err, redress_scheduler::SchedulerError::Config(_)));
}
