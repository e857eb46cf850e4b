//! Integration tests for post-commit side effects
//!
//! Persistence and notification failures must never roll back a committed
//! transition; they are queued in the outbox and retried.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use mockall::mock;
use redress::{
    ActorRole, EngineConfig, EventBus, EventType, Grievance, GrievanceService, GrievanceStatus,
    GrievanceStore, ManualClock, MemoryStore, Notifier, NotifyError, NotifyResult, SaveOutcome,
    SharedClock, SharedNotifier, SharedStore, SideEffectKind, StatusChange, StoreError,
    StoreResult,
};

mock! {
    pub Gateway {}

    #[async_trait]
    impl Notifier for Gateway {
        async fn notify(&self, change: StatusChange) -> NotifyResult<()>;
    }
}

/// Store that can be switched off
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
    delay: Option<Duration>,
}

impl FlakyStore {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl GrievanceStore for FlakyStore {
    async fn load(&self, id: &str) -> StoreResult<Option<Grievance>> {
        self.inner.load(id).await
    }

    async fn save(&self, grievance: &Grievance) -> StoreResult<SaveOutcome> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database offline".to_string()));
        }
        self.inner.save(grievance).await
    }

    async fn list_open(&self) -> StoreResult<Vec<Grievance>> {
        self.inner.list_open().await
    }

    async fn list_all(&self) -> StoreResult<Vec<Grievance>> {
        self.inner.list_all().await
    }
}

fn service_with(
    store: Arc<FlakyStore>,
    notifier: SharedNotifier,
    config: EngineConfig,
) -> GrievanceService {
    GrievanceService::new(
        engine(),
        store as SharedStore,
        notifier,
        Arc::new(ManualClock::new(t0())) as SharedClock,
    )
    .with_config(config)
}

/// Test: a closed grievance stays in memory until its save lands
#[tokio::test]
async fn test_unsaved_closed_grievance_is_kept_until_retry() {
    let store = Arc::new(FlakyStore::default());
    let service = service_with(
        store.clone(),
        EventBus::new().shared() as SharedNotifier,
        EngineConfig::default(),
    );
    let g = service
        .file_grievance(utilities_filing(), citizen())
        .await
        .unwrap();

    store.set_down(true);
    let withdrawn = service.withdraw(&g.id, citizen()).await.unwrap();
    assert_eq!(service.held().await, 1);
    assert_eq!(service.get(&g.id).await.unwrap(), withdrawn);
    assert_eq!(service.held().await, 1);

    store.set_down(false);
    let report = service.retry_side_effects().await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(service.held().await, 0);

    let stored = service.get(&g.id).await.unwrap();
    assert_eq!(stored.status, GrievanceStatus::Withdrawn);
    assert_eq!(stored.version, withdrawn.version);
}

/// Test: a failed save keeps the transition and queues a retry
#[tokio::test]
async fn test_persist_failure_does_not_roll_back() {
    let store = Arc::new(FlakyStore::default());
    let service = service_with(
        store.clone(),
        EventBus::new().shared() as SharedNotifier,
        EngineConfig::default(),
    );
    let g = service
        .file_grievance(utilities_filing(), citizen())
        .await
        .unwrap();

    store.set_down(true);
    let reviewed = service.acknowledge(&g.id, handler("L0")).await.unwrap();
    assert_eq!(reviewed.status, GrievanceStatus::UnderReview);
    assert_eq!(service.get(&g.id).await.unwrap(), reviewed);

    let pending = service.pending_side_effects().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, SideEffectKind::Persist);
    assert_eq!(pending[0].version, reviewed.version);
    assert_eq!(pending[0].attempts, 1);

    // Still down: attempt counted, entry kept
    let report = service.retry_side_effects().await;
    assert_eq!((report.retried, report.succeeded), (1, 0));
    assert_eq!(service.pending_side_effects().await[0].attempts, 2);

    store.set_down(false);
    let report = service.retry_side_effects().await;
    assert_eq!(report.succeeded, 1);
    assert!(service.pending_side_effects().await.is_empty());
    let stored = store.load(&g.id).await.unwrap().unwrap();
    assert_eq!(stored.status, GrievanceStatus::UnderReview);
}

/// Test: a later successful save clears older queued saves
#[tokio::test]
async fn test_later_save_supersedes_failed_one() {
    let store = Arc::new(FlakyStore::default());
    let service = service_with(
        store.clone(),
        EventBus::new().shared() as SharedNotifier,
        EngineConfig::default(),
    );
    let g = service
        .file_grievance(utilities_filing(), citizen())
        .await
        .unwrap();

    store.set_down(true);
    service.assign(&g.id, "officer-2", handler("L0")).await.unwrap();
    assert_eq!(service.pending_side_effects().await.len(), 1);

    store.set_down(false);
    service.acknowledge(&g.id, handler("L0")).await.unwrap();
    assert!(service.pending_side_effects().await.is_empty());
}

/// Test: failures are dropped after max_attempts
#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    let store = Arc::new(FlakyStore::default());
    let mut config = EngineConfig::default();
    config.side_effects.max_attempts = 2;
    let service = service_with(store.clone(), EventBus::new().shared() as SharedNotifier, config);

    store.set_down(true);
    service
        .file_grievance(utilities_filing(), citizen())
        .await
        .unwrap();

    let report = service.retry_side_effects().await;
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].attempts, 2);
    assert!(service.pending_side_effects().await.is_empty());
}

/// Test: the notifier hears about every commit with the mapped recipient
#[tokio::test]
async fn test_notifications_carry_recipient_role() {
    let mut notifier = MockGateway::new();
    notifier
        .expect_notify()
        .withf(|change| {
            change.event_type == EventType::Submit && change.recipient == ActorRole::AuthorityHandler
        })
        .times(1)
        .returning(|_| Ok(()));
    notifier
        .expect_notify()
        .withf(|change| {
            change.event_type == EventType::RequestInfo
                && change.recipient == ActorRole::Citizen
                && change.status == GrievanceStatus::InfoRequested
        })
        .times(1)
        .returning(|_| Ok(()));

    let service = service_with(
        Arc::new(FlakyStore::default()),
        Arc::new(notifier) as SharedNotifier,
        EngineConfig::default(),
    );
    let g = service
        .file_grievance(utilities_filing(), citizen())
        .await
        .unwrap();
    service.request_info(&g.id, handler("L0")).await.unwrap();
    assert!(service.pending_side_effects().await.is_empty());
}

/// Test: a failing notifier is retried with the original change
#[tokio::test]
async fn test_notify_failure_is_queued_and_replayed() {
    let mut notifier = MockGateway::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    notifier
        .expect_notify()
        .withf(|change| change.event_type == EventType::Submit && change.version == 0)
        .times(2)
        .returning(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(NotifyError::DeliveryFailed("gateway down".to_string()))
            } else {
                Ok(())
            }
        });

    let service = service_with(
        Arc::new(FlakyStore::default()),
        Arc::new(notifier) as SharedNotifier,
        EngineConfig::default(),
    );
    let g = service
        .file_grievance(utilities_filing(), citizen())
        .await
        .unwrap();
    assert_eq!(g.status, GrievanceStatus::Submitted);

    let pending = service.pending_side_effects().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, SideEffectKind::Notify);

    let report = service.retry_side_effects().await;
    assert_eq!(report.succeeded, 1);
    assert!(service.pending_side_effects().await.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Test: a hung store times out instead of blocking the caller
#[tokio::test(start_paused = true)]
async fn test_slow_store_times_out() {
    let store = Arc::new(FlakyStore {
        delay: Some(Duration::from_secs(60)),
        ..Default::default()
    });
    let mut config = EngineConfig::default();
    config.side_effects.timeout_ms = 500;
    let service = service_with(store, EventBus::new().shared() as SharedNotifier, config);

    let g = service
        .file_grievance(utilities_filing(), citizen())
        .await
        .unwrap();
    assert_eq!(g.status, GrievanceStatus::Submitted);

    let pending = service.pending_side_effects().await;
    assert_eq!(pending.len(), 1);
    assert!(pending[0].error.contains("timed out"), "{}", pending[0].error);
}
