//! Engine error types
//!
//! Every failure the engine reports is a typed variant of [`GrievanceError`].
//! Failures of post-commit side effects (persistence, notification) are a
//! separate class, [`SideEffectFailure`], because they never undo a
//! committed transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grievance::{GrievanceId, GrievanceStatus};
use crate::lifecycle::Action;
use crate::lifecycle::access::ActorRole;

/// Result type alias for engine operations
pub type GrievanceResult<T> = Result<T, GrievanceError>;

/// Errors returned by lifecycle operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrievanceError {
    /// The grievance is in the wrong status for the requested action
    #[error("Cannot {action} grievance {grievance_id} while {status}: {reason}")]
    InvalidTransition {
        grievance_id: GrievanceId,
        action: Action,
        status: GrievanceStatus,
        reason: String,
    },

    /// The actor may not perform this action on this grievance
    #[error("{role} may not {action} grievance {grievance_id}: {reason}")]
    Unauthorized {
        grievance_id: GrievanceId,
        action: Action,
        role: ActorRole,
        reason: String,
    },

    /// The grievance is closed and accepts no further transitions
    #[error("Grievance {grievance_id} is {status} and cannot be modified")]
    TerminalStateViolation {
        grievance_id: GrievanceId,
        status: GrievanceStatus,
    },

    /// No escalation rule covers this category within the department
    #[error("No escalation rule for category '{category}' in department {department_id}")]
    RuleNotFound {
        category: String,
        department_id: String,
    },

    /// Already at the apex of the escalation chain
    #[error("Grievance {grievance_id} is at escalation level {level}, the apex of rule {rule_id}")]
    NoFurtherEscalation {
        grievance_id: GrievanceId,
        rule_id: String,
        level: usize,
    },

    /// No grievance with this id
    #[error("Grievance not found: {grievance_id}")]
    RecordNotFound { grievance_id: GrievanceId },

    /// An authority id that the directory does not know
    #[error("Unknown authority: {authority_id}")]
    UnknownAuthority { authority_id: String },

    /// An advisory categorization that failed validation
    #[error("Rejected categorization suggestion: {message}")]
    InvalidSuggestion { message: String },

    /// Persistence collaborator failure while loading
    #[error("Store error: {message}")]
    Store { message: String },

    /// Hierarchy or engine configuration is invalid
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl GrievanceError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a record-not-found error
    pub fn not_found(grievance_id: impl Into<GrievanceId>) -> Self {
        Self::RecordNotFound {
            grievance_id: grievance_id.into(),
        }
    }

    /// Create an invalid-suggestion error
    pub fn invalid_suggestion(message: impl Into<String>) -> Self {
        Self::InvalidSuggestion {
            message: message.into(),
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::TerminalStateViolation { .. } => "TERMINAL_STATE_VIOLATION",
            Self::RuleNotFound { .. } => "RULE_NOT_FOUND",
            Self::NoFurtherEscalation { .. } => "NO_FURTHER_ESCALATION",
            Self::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            Self::UnknownAuthority { .. } => "UNKNOWN_AUTHORITY",
            Self::InvalidSuggestion { .. } => "INVALID_SUGGESTION",
            Self::Store { .. } => "STORE_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }

    /// Whether an automatic sweep should hand this case to a human
    pub fn needs_manual_intervention(&self) -> bool {
        matches!(
            self,
            Self::NoFurtherEscalation { .. } | Self::RuleNotFound { .. }
        )
    }

    /// Check if this error is retryable (transient failure)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

/// Which post-commit side effect failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectKind {
    /// Saving the committed grievance to the store
    Persist,
    /// Publishing the status change notification
    Notify,
}

impl std::fmt::Display for SideEffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persist => write!(f, "persist"),
            Self::Notify => write!(f, "notify"),
        }
    }
}

/// A side effect that failed after its transition committed.
///
/// The transition stands. The failure is queued for retry and alerting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SideEffectFailure {
    pub kind: SideEffectKind,
    pub grievance_id: GrievanceId,
    /// Grievance version the side effect was for
    pub version: u64,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl std::fmt::Display for SideEffectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed for grievance {} v{} after {} attempt(s): {}",
            self.kind, self.grievance_id, self.version, self.attempts, self.error
        )
    }
}

impl std::error::Error for SideEffectFailure {}
