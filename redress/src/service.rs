//! Grievance service: the inbound surface of the engine
//!
//! Owns the live records and serializes work on each one behind its own
//! async mutex. Actor requests and deadline sweeps take the same lock, so a
//! grievance never sees two transitions race. Persistence and notification
//! run after the commit and outside the lock; their failures land in a retry
//! outbox and never undo the transition. Closed grievances are released
//! from memory once safely stored; later reads load them from the store.
//!
//! ```text
//! request ──► lock(record) ──► engine.apply ──► unlock ──► persist ──► notify
//!                                                             │          │
//!                                                             └── outbox ┘
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::categorize::Categorizer;
use crate::clock::{Clock, SharedClock};
use crate::config::EngineConfig;
use crate::error::{GrievanceError, GrievanceResult, SideEffectFailure, SideEffectKind};
use crate::grievance::{Grievance, GrievanceId, NewGrievance};
use crate::lifecycle::{ActionRequest, Command, TransitionEngine, TransitionPlan};
use crate::notify::{Notifier, SharedNotifier, StatusChange};
use crate::scheduler::{EscalationScheduler, SweepReport, TickOutcome};
use crate::store::{GrievanceStore, SaveOutcome, SharedStore};

type RecordHandle = Arc<Mutex<Grievance>>;

/// An outbox entry: the failure plus what is needed to replay it
#[derive(Debug, Clone)]
struct PendingEffect {
    failure: SideEffectFailure,
    change: Option<StatusChange>,
}

/// Outcome of one outbox retry pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub retried: usize,
    pub succeeded: usize,
    /// Failures that used up their attempts and were dropped
    pub dropped: Vec<SideEffectFailure>,
}

/// Grievance lifecycle service
pub struct GrievanceService {
    engine: Arc<TransitionEngine>,
    store: SharedStore,
    notifier: SharedNotifier,
    clock: SharedClock,
    config: EngineConfig,
    categorizer: Option<Arc<dyn Categorizer>>,
    records: RwLock<HashMap<GrievanceId, RecordHandle>>,
    outbox: Mutex<Vec<PendingEffect>>,
}

impl GrievanceService {
    pub fn new(
        engine: Arc<TransitionEngine>,
        store: SharedStore,
        notifier: SharedNotifier,
        clock: SharedClock,
    ) -> Self {
        Self {
            engine,
            store,
            notifier,
            clock,
            config: EngineConfig::default(),
            categorizer: None,
            records: RwLock::new(HashMap::new()),
            outbox: Mutex::new(Vec::new()),
        }
    }

    /// Use sweep and side-effect settings from `config`
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable assisted categorization for `file_grievance_with_assist`
    pub fn with_categorizer(mut self, categorizer: Arc<dyn Categorizer>) -> Self {
        self.categorizer = Some(categorizer);
        self
    }

    pub fn engine(&self) -> &Arc<TransitionEngine> {
        &self.engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load every open grievance from the store into memory.
    ///
    /// Sweeps only see records the service holds, so call this at startup.
    pub async fn hydrate(&self) -> GrievanceResult<usize> {
        let open = self
            .store
            .list_open()
            .await
            .map_err(|e| GrievanceError::store(e.to_string()))?;
        let count = open.len();
        let mut records = self.records.write().await;
        for grievance in open {
            records
                .entry(grievance.id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(grievance)));
        }
        info!(count, "Hydrated open grievances");
        Ok(count)
    }

    // =========================================================================
    // Filing
    // =========================================================================

    /// File a new grievance routed by its category and department
    pub async fn file_grievance(
        &self,
        new: NewGrievance,
        request: ActionRequest,
    ) -> GrievanceResult<Grievance> {
        let now = self.clock.now();
        let grievance = self.engine.file(Grievance::new_id(), new, &request, now)?;

        self.records
            .write()
            .await
            .insert(grievance.id.clone(), Arc::new(Mutex::new(grievance.clone())));

        info!(
            grievance_id = %grievance.id,
            to = %grievance.status,
            authority = %grievance.authority_id,
            category = %grievance.category,
            "Grievance filed"
        );
        self.run_side_effects(&grievance).await;
        Ok(grievance)
    }

    /// File, asking the categorizer for a category and department when the
    /// filing leaves them blank. The suggestion must match a configured rule.
    pub async fn file_grievance_with_assist(
        &self,
        mut new: NewGrievance,
        request: ActionRequest,
    ) -> GrievanceResult<Grievance> {
        if new.needs_categorization() {
            if let Some(categorizer) = &self.categorizer {
                let suggestion = categorizer
                    .suggest(&new)
                    .await
                    .map_err(|e| GrievanceError::invalid_suggestion(e.to_string()))?;
                let rule = self.engine.rules().validate_suggestion(&suggestion)?;
                debug!(
                    rule = %rule.id,
                    confidence = suggestion.confidence,
                    "Accepted categorization suggestion"
                );
                new.category = rule.category.clone();
                new.department_id = rule.department_id.clone();
            }
        }
        self.file_grievance(new, request).await
    }

    // =========================================================================
    // Actor operations
    // =========================================================================

    pub async fn acknowledge(&self, id: &str, request: ActionRequest) -> GrievanceResult<Grievance> {
        self.act(id, Command::Acknowledge, request).await
    }

    pub async fn assign(
        &self,
        id: &str,
        assignee_id: impl Into<String>,
        request: ActionRequest,
    ) -> GrievanceResult<Grievance> {
        let command = Command::Assign {
            assignee_id: assignee_id.into(),
        };
        self.act(id, command, request).await
    }

    pub async fn request_info(&self, id: &str, request: ActionRequest) -> GrievanceResult<Grievance> {
        self.act(id, Command::RequestInfo, request).await
    }

    pub async fn provide_info(&self, id: &str, request: ActionRequest) -> GrievanceResult<Grievance> {
        self.act(id, Command::ProvideInfo, request).await
    }

    pub async fn resolve(&self, id: &str, request: ActionRequest) -> GrievanceResult<Grievance> {
        self.act(id, Command::Resolve, request).await
    }

    pub async fn accept(&self, id: &str, request: ActionRequest) -> GrievanceResult<Grievance> {
        self.act(id, Command::Accept, request).await
    }

    pub async fn dispute(&self, id: &str, request: ActionRequest) -> GrievanceResult<Grievance> {
        self.act(id, Command::Dispute, request).await
    }

    pub async fn forward(
        &self,
        id: &str,
        to_authority_id: impl Into<String>,
        request: ActionRequest,
    ) -> GrievanceResult<Grievance> {
        let command = Command::Forward {
            to_authority_id: to_authority_id.into(),
        };
        self.act(id, command, request).await
    }

    pub async fn escalate(&self, id: &str, request: ActionRequest) -> GrievanceResult<Grievance> {
        self.act(id, Command::Escalate, request).await
    }

    pub async fn authority_escalate(
        &self,
        id: &str,
        request: ActionRequest,
    ) -> GrievanceResult<Grievance> {
        self.act(id, Command::AuthorityEscalate, request).await
    }

    pub async fn withdraw(&self, id: &str, request: ActionRequest) -> GrievanceResult<Grievance> {
        self.act(id, Command::Withdraw, request).await
    }

    pub async fn archive(&self, id: &str, request: ActionRequest) -> GrievanceResult<Grievance> {
        self.act(id, Command::Archive, request).await
    }

    /// Apply any command through the engine
    pub async fn act(
        &self,
        id: &str,
        command: Command,
        request: ActionRequest,
    ) -> GrievanceResult<Grievance> {
        let handle = self.handle(id).await?;
        let (snapshot, plan) = {
            let mut grievance = handle.lock().await;
            let now = self.clock.now();
            let plan = self.engine.apply(&mut grievance, &command, &request, now)?;
            (grievance.clone(), plan)
        };

        log_transition(&snapshot, &plan);
        self.run_side_effects(&snapshot).await;
        Ok(snapshot)
    }

    /// Current state of a grievance.
    ///
    /// With `sweep.evaluate_on_read` set, a due system transition is applied
    /// first so the caller never sees a stale deadline.
    pub async fn get(&self, id: &str) -> GrievanceResult<Grievance> {
        if self.config.sweep.evaluate_on_read {
            let now = self.clock.now();
            match self.refresh(id, now).await {
                Ok(_) => {}
                Err(err) if err.needs_manual_intervention() => {
                    debug!(grievance_id = id, code = err.code(), "On-read evaluation: {}", err);
                }
                Err(err) => return Err(err),
            }
        }
        let handle = self.handle(id).await?;
        let grievance = handle.lock().await.clone();
        self.release_if_closed(&grievance).await;
        Ok(grievance)
    }

    /// Number of grievances held in memory: open ones plus closed ones
    /// whose save is still pending
    pub async fn held(&self) -> usize {
        self.records.read().await.len()
    }

    /// Snapshot of every grievance the service holds
    pub async fn list(&self) -> Vec<Grievance> {
        let handles: Vec<RecordHandle> = self.records.read().await.values().cloned().collect();
        let mut all = Vec::with_capacity(handles.len());
        for handle in handles {
            all.push(handle.lock().await.clone());
        }
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    // =========================================================================
    // Deadline sweeps
    // =========================================================================

    /// Evaluate one grievance at `now` and apply a due system transition
    pub async fn refresh(&self, id: &str, now: DateTime<Utc>) -> GrievanceResult<TickOutcome> {
        let handle = self.handle(id).await?;
        self.tick_handle(&handle, now).await
    }

    /// Evaluate every open grievance at `now`.
    ///
    /// Per-grievance failures are collected in the report; one bad record
    /// never stops the sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let handles: Vec<(GrievanceId, RecordHandle)> = self
            .records
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();

        let max_concurrency = self.config.sweep.max_concurrency.max(1);
        let mut results: Vec<(GrievanceId, Option<GrievanceResult<TickOutcome>>)> =
            stream::iter(handles)
                .map(|(id, handle)| async move {
                    let outcome = self.tick_open(&handle, now).await;
                    (id, outcome)
                })
                .buffer_unordered(max_concurrency)
                .collect()
                .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        let mut report = SweepReport::new(now);
        for (id, outcome) in results {
            if let Some(outcome) = outcome {
                report.record(&id, outcome);
            }
        }

        if report.is_quiet() {
            debug!(summary = %report.summary(), "Sweep complete");
        } else {
            info!(summary = %report.summary(), "Sweep complete");
        }
        report
    }

    /// Tick a record unless it is already closed. A closed record still held
    /// here missed its release (it was busy at the time), so retry that.
    async fn tick_open(
        &self,
        handle: &RecordHandle,
        now: DateTime<Utc>,
    ) -> Option<GrievanceResult<TickOutcome>> {
        let snapshot = handle.lock().await.clone();
        if snapshot.is_terminal() {
            self.release_if_closed(&snapshot).await;
            return None;
        }
        Some(self.tick_handle(handle, now).await)
    }

    async fn tick_handle(
        &self,
        handle: &RecordHandle,
        now: DateTime<Utc>,
    ) -> GrievanceResult<TickOutcome> {
        let (outcome, snapshot) = {
            let mut grievance = handle.lock().await;
            let outcome = EscalationScheduler::new(&self.engine).tick(&mut grievance, now)?;
            let snapshot = match &outcome {
                TickOutcome::Transitioned { plan, .. } => {
                    log_transition(&grievance, plan);
                    Some(grievance.clone())
                }
                _ => None,
            };
            (outcome, snapshot)
        };

        if let Some(snapshot) = snapshot {
            self.run_side_effects(&snapshot).await;
        }
        Ok(outcome)
    }

    // =========================================================================
    // Side effects
    // =========================================================================

    /// Failures waiting for retry
    pub async fn pending_side_effects(&self) -> Vec<SideEffectFailure> {
        self.outbox
            .lock()
            .await
            .iter()
            .map(|pending| pending.failure.clone())
            .collect()
    }

    /// Retry every queued side effect once.
    ///
    /// Persist retries save the record as it is now, which also covers any
    /// later version. Entries that reach `max_attempts` are dropped and
    /// returned in the report.
    pub async fn retry_side_effects(&self) -> RetryReport {
        let pending = std::mem::take(&mut *self.outbox.lock().await);
        let mut report = RetryReport {
            retried: pending.len(),
            ..Default::default()
        };
        let mut still_pending = Vec::new();

        for mut entry in pending {
            let result = match entry.failure.kind {
                SideEffectKind::Persist => match self.current(&entry.failure.grievance_id).await {
                    Some(grievance) => {
                        let saved = self.persist(&grievance).await;
                        if saved.is_ok() {
                            self.release_if_closed(&grievance).await;
                        }
                        saved
                    }
                    None => Err("record no longer held by the service".to_string()),
                },
                SideEffectKind::Notify => match entry.change.clone() {
                    Some(change) => self.deliver(change).await,
                    None => Ok(()),
                },
            };

            match result {
                Ok(()) => report.succeeded += 1,
                Err(error) => {
                    entry.failure.attempts += 1;
                    entry.failure.error = error;
                    entry.failure.failed_at = self.clock.now();
                    if entry.failure.attempts >= self.config.side_effects.max_attempts {
                        warn!(failure = %entry.failure, "Dropping side effect after final attempt");
                        report.dropped.push(entry.failure);
                    } else {
                        still_pending.push(entry);
                    }
                }
            }
        }

        if report.retried > 0 {
            info!(
                retried = report.retried,
                succeeded = report.succeeded,
                dropped = report.dropped.len(),
                "Side effect retry pass"
            );
        }
        self.outbox.lock().await.extend(still_pending);
        report
    }

    async fn run_side_effects(&self, grievance: &Grievance) {
        match self.persist(grievance).await {
            Ok(()) => self.clear_persist_failures(grievance).await,
            Err(error) => {
                self.enqueue(SideEffectKind::Persist, grievance, error, None)
                    .await
            }
        }

        if let Some(change) = StatusChange::from_latest(grievance) {
            if let Err(error) = self.deliver(change.clone()).await {
                self.enqueue(SideEffectKind::Notify, grievance, error, Some(change))
                    .await;
            }
        }

        self.release_if_closed(grievance).await;
    }

    async fn persist(&self, grievance: &Grievance) -> Result<(), String> {
        match self.bounded(self.store.save(grievance)).await? {
            Ok(SaveOutcome::Written) => Ok(()),
            Ok(SaveOutcome::Stale { stored_version }) => {
                debug!(
                    grievance_id = %grievance.id,
                    version = grievance.version,
                    stored_version,
                    "Skipped stale save"
                );
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    async fn deliver(&self, change: StatusChange) -> Result<(), String> {
        self.bounded(self.notifier.notify(change))
            .await?
            .map_err(|e| e.to_string())
    }

    /// Run a side effect under the configured timeout
    async fn bounded<T>(&self, effect: impl Future<Output = T>) -> Result<T, String> {
        let limit = self.config.side_effects.timeout();
        tokio::time::timeout(limit, effect)
            .await
            .map_err(|_| format!("timed out after {}ms", limit.as_millis()))
    }

    async fn enqueue(
        &self,
        kind: SideEffectKind,
        grievance: &Grievance,
        error: String,
        change: Option<StatusChange>,
    ) {
        let failure = SideEffectFailure {
            kind,
            grievance_id: grievance.id.clone(),
            version: grievance.version,
            error,
            attempts: 1,
            failed_at: self.clock.now(),
        };
        warn!(
            grievance_id = %failure.grievance_id,
            version = failure.version,
            kind = %failure.kind,
            "Side effect failed, queued for retry: {}",
            failure.error
        );
        self.outbox.lock().await.push(PendingEffect { failure, change });
    }

    /// A successful save supersedes older failed saves of the same record
    async fn clear_persist_failures(&self, grievance: &Grievance) {
        self.outbox.lock().await.retain(|pending| {
            !(pending.failure.kind == SideEffectKind::Persist
                && pending.failure.grievance_id == grievance.id
                && pending.failure.version <= grievance.version)
        });
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Live handle for `id`, loading from the store on first access
    async fn handle(&self, id: &str) -> GrievanceResult<RecordHandle> {
        if let Some(handle) = self.records.read().await.get(id) {
            return Ok(handle.clone());
        }

        let loaded = self
            .store
            .load(id)
            .await
            .map_err(|e| GrievanceError::store(e.to_string()))?
            .ok_or_else(|| GrievanceError::not_found(id))?;

        let mut records = self.records.write().await;
        let handle = records
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)));
        Ok(handle.clone())
    }

    /// Drop a closed record from memory once its latest version is stored.
    ///
    /// A record with a queued save stays held so the retry can reach it. A
    /// record that is locked or has moved past `grievance.version` is left
    /// to whoever holds it.
    async fn release_if_closed(&self, grievance: &Grievance) {
        if !grievance.is_terminal() {
            return;
        }
        let unsaved = self.outbox.lock().await.iter().any(|pending| {
            pending.failure.kind == SideEffectKind::Persist
                && pending.failure.grievance_id == grievance.id
        });
        if unsaved {
            return;
        }

        let mut records = self.records.write().await;
        let idle = match records.get(&grievance.id) {
            Some(handle) => handle
                .try_lock()
                .map(|held| held.version == grievance.version)
                .unwrap_or(false),
            None => return,
        };
        if idle {
            records.remove(&grievance.id);
            debug!(
                grievance_id = %grievance.id,
                status = %grievance.status,
                "Released closed grievance"
            );
        }
    }

    async fn current(&self, id: &str) -> Option<Grievance> {
        let handle = self.records.read().await.get(id).cloned()?;
        let grievance = handle.lock().await.clone();
        Some(grievance)
    }
}

fn log_transition(grievance: &Grievance, plan: &TransitionPlan) {
    info!(
        grievance_id = %grievance.id,
        from = %plan.from_status,
        to = %plan.to_status,
        event = %plan.event_type,
        moved = plan.changes_owner(),
        level = grievance.escalation_level,
        authority = %grievance.authority_id,
        "Transition committed"
    );
}
