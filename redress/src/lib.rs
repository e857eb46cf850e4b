//! Redress: grievance lifecycle and escalation engine
//!
//! This library provides:
//! - A deterministic state machine for citizen grievances, from filing to archive
//! - Deadline evaluation over SLA, authority-response and citizen-response windows
//! - Scheduled sweeps that escalate or auto-close grievances whose deadlines lapsed
//!
//! # Components
//!
//! ## Reference data
//! - `directory`: authority hierarchy (offices, levels, parents, administrators)
//! - `rules`: escalation rule per (category, department)
//!
//! ## Core
//! - `deadline`: pure window arithmetic
//! - `lifecycle`: transition engine and role permission table
//! - `scheduler`: due-transition evaluation and sweep reports
//!
//! ## Collaborators
//! - `store`: persistence (in-memory, RocksDB with `heavy-state`)
//! - `notify`: status change notifications over a broadcast bus
//! - `categorize`: advisory category suggestions from an LLM endpoint
//!
//! ## Service
//! - `service`: per-record locking, post-commit side effects, retry outbox
//!
//! # Usage
//!
//! ```bash
//! # Run the sweep daemon against a config file
//! redress-scheduler --config redress.toml
//!
//! # One sweep and exit
//! redress-scheduler --config redress.toml --once
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod categorize;
pub mod clock;
pub mod config;
pub mod deadline;
pub mod directory;
pub mod error;
pub mod grievance;
pub mod lifecycle;
pub mod notify;
pub mod rules;
pub mod scheduler;
pub mod service;
pub mod store;

// Re-export key types
pub use categorize::{Categorizer, CategorizerConfig, CategorySuggestion, HttpCategorizer};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigError, ConfigResult, EngineConfig, HierarchyConfig, SideEffectConfig, SweepConfig};
pub use deadline::{DeadlineEvaluator, DeadlinePolicy};
pub use directory::{Authority, AuthorityDirectory, AuthorityId, DepartmentId, SharedDirectory};
pub use error::{GrievanceError, GrievanceResult, SideEffectFailure, SideEffectKind};
pub use grievance::{
    EventType, Grievance, GrievanceEvent, GrievanceId, GrievanceStatus, NewGrievance, Privacy,
};
pub use lifecycle::access::ActorRole;
pub use lifecycle::{Action, ActionRequest, Actor, Command, TransitionEngine, TransitionPlan};
pub use notify::{EventBus, Notifier, NotifyError, NotifyResult, SharedNotifier, StatusChange};
pub use rules::{EscalationRule, RuleSet, SharedRuleSet};
pub use scheduler::{evaluate, EscalationScheduler, SweepReport, SystemTransition, TickOutcome};
pub use service::{GrievanceService, RetryReport};
pub use store::{GrievanceStore, MemoryStore, SaveOutcome, SharedStore, StoreError, StoreResult};
