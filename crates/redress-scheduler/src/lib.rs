//! Interval sweep daemon for the redress engine
//!
//! Runs `sweep(now)` on a fixed interval, retries queued side effects after
//! every sweep, and stops cleanly on cancellation.
//!
//! ```text
//! interval tick ──► sweep(now) ──► retry outbox ──► stats
//!       ▲                                            │
//!       └──────────── until cancelled ◄──────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redress::config::{ConfigError, EngineConfig};
use redress::{
    Clock, EventBus, GrievanceError, GrievanceService, MemoryStore, RetryReport, SharedClock,
    SharedNotifier, SharedStore, StatusChange, SweepReport, SystemClock, TransitionEngine,
};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors raised while assembling the service
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("engine: {0}")]
    Engine(#[from] GrievanceError),

    #[error("state store: {0}")]
    Store(String),
}

/// What the loop drives; implemented by the grievance service
#[async_trait]
pub trait SweepTarget: Send + Sync {
    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport;
    async fn retry_side_effects(&self) -> RetryReport;
}

#[async_trait]
impl SweepTarget for GrievanceService {
    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        GrievanceService::sweep(self, now).await
    }

    async fn retry_side_effects(&self) -> RetryReport {
        GrievanceService::retry_side_effects(self).await
    }
}

/// Totals across the lifetime of a loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub sweeps: u64,
    pub transitions: u64,
    pub manual_interventions: u64,
    pub failures: u64,
    pub dropped_side_effects: u64,
}

impl LoopStats {
    fn absorb(&mut self, report: &SweepReport, retry: &RetryReport) {
        self.sweeps += 1;
        self.transitions += report.transitions.len() as u64;
        self.manual_interventions += report.manual_intervention.len() as u64;
        self.failures += report.failures.len() as u64;
        self.dropped_side_effects += retry.dropped.len() as u64;
    }
}

/// Fixed-interval sweep loop
pub struct SchedulerLoop<T: SweepTarget + ?Sized> {
    target: Arc<T>,
    clock: SharedClock,
    interval: Duration,
    cancel: CancellationToken,
}

impl<T: SweepTarget + ?Sized> SchedulerLoop<T> {
    pub fn new(target: Arc<T>, clock: SharedClock, interval: Duration) -> Self {
        Self {
            target,
            clock,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// One sweep plus one outbox retry pass
    pub async fn run_once(&self) -> (SweepReport, RetryReport) {
        let now = self.clock.now();
        let report = self.target.sweep(now).await;
        let retry = self.target.retry_side_effects().await;
        (report, retry)
    }

    /// Sweep on every tick until cancelled. The first sweep runs immediately.
    pub async fn run(&self) -> LoopStats {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = LoopStats::default();

        info!(interval_secs = self.interval.as_secs(), "Scheduler loop started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let (report, retry) = self.run_once().await;
                    stats.absorb(&report, &retry);
                    debug!(summary = %report.summary(), sweeps = stats.sweeps, "Tick complete");
                }
            }
        }
        info!(
            sweeps = stats.sweeps,
            transitions = stats.transitions,
            "Scheduler loop stopped"
        );
        stats
    }
}

/// Everything the daemon needs, wired from configuration
pub struct Assembly {
    pub service: Arc<GrievanceService>,
    pub bus: Arc<EventBus>,
    pub clock: SharedClock,
}

/// Build the service from `config`: hierarchy, store, notifier, clock.
///
/// Open grievances are hydrated from the store before returning.
pub async fn assemble(config: EngineConfig) -> Result<Assembly, SchedulerError> {
    let (directory, rules) = config.load_hierarchy()?;
    info!(
        authorities = directory.len(),
        rules = rules.len(),
        "Hierarchy loaded"
    );

    let engine = Arc::new(TransitionEngine::new(rules, config.deadlines));
    let store = open_store(&config)?;
    let bus = EventBus::new().shared();
    let clock: SharedClock = Arc::new(SystemClock);

    let service = GrievanceService::new(engine, store, bus.clone() as SharedNotifier, clock.clone())
        .with_config(config);
    service.hydrate().await?;

    Ok(Assembly {
        service: Arc::new(service),
        bus,
        clock,
    })
}

#[cfg(feature = "heavy-state")]
fn open_store(config: &EngineConfig) -> Result<SharedStore, SchedulerError> {
    match &config.state_path {
        Some(path) => {
            info!(path = %path.display(), "Opening RocksDB state store");
            let store = redress::store::RocksStore::open(path)
                .map_err(|e| SchedulerError::Store(e.to_string()))?;
            Ok(store.shared() as SharedStore)
        }
        None => Ok(MemoryStore::new().shared() as SharedStore),
    }
}

#[cfg(not(feature = "heavy-state"))]
fn open_store(config: &EngineConfig) -> Result<SharedStore, SchedulerError> {
    if let Some(path) = &config.state_path {
        warn!(
            path = %path.display(),
            "state_path ignored: built without heavy-state, using in-memory store"
        );
    }
    Ok(MemoryStore::new().shared() as SharedStore)
}

/// Log every status change until cancelled. Stand-in for a delivery adapter.
pub async fn log_notifications(mut rx: broadcast::Receiver<StatusChange>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(change) => info!(
                    grievance_id = %change.grievance_id,
                    event = %change.event_type,
                    status = %change.status,
                    recipient = %change.recipient,
                    "Notify"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
