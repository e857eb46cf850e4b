//! Transition Engine: deterministic grievance state machine
//!
//! Validates and applies actor-initiated and system-initiated transitions.
//! This is a pure state machine: no I/O, no clock reads. Persistence and
//! notification happen in the service layer after a transition commits.
//!
//! # Lifecycle
//!
//! ```text
//! SUBMITTED ──ack──► UNDER_REVIEW ◄──info/dispute──┐
//!     │                  │                         │
//!     ├── request_info ──┼──► INFO_REQUESTED ──────┤ (auto-close → CLOSED_NO_RESPONSE)
//!     ├── resolve ───────┼──► RESOLVED_PENDING_CONFIRM ─accept─► CLOSED_ACCEPTED
//!     │                  │         (auto-close → CLOSED_AUTO)
//!     ├── SLA breach ────┴──► ESCALATED (next level of the rule chain)
//!     └── no response ───────► AUTHORITY_ESCALATED (administrator queue)
//!
//! any open status ──withdraw──► WITHDRAWN
//! closed ──archive──► ARCHIVED
//! ```

pub mod access;
pub mod engine;

use serde::{Deserialize, Serialize};

use crate::directory::AuthorityId;
use crate::grievance::AttachmentRef;
use access::ActorRole;

pub use access::{AccessDenied, Grant, PermissionTable};
pub use engine::{TransitionEngine, TransitionPlan};

/// Who is performing an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Citizen {
        id: String,
    },
    AuthorityHandler {
        id: String,
        authority_id: AuthorityId,
    },
    AuthorityAdmin {
        id: String,
        authority_id: AuthorityId,
    },
    System,
}

impl Actor {
    pub fn citizen(id: impl Into<String>) -> Self {
        Self::Citizen { id: id.into() }
    }

    pub fn handler(id: impl Into<String>, authority_id: impl Into<AuthorityId>) -> Self {
        Self::AuthorityHandler {
            id: id.into(),
            authority_id: authority_id.into(),
        }
    }

    pub fn admin(id: impl Into<String>, authority_id: impl Into<AuthorityId>) -> Self {
        Self::AuthorityAdmin {
            id: id.into(),
            authority_id: authority_id.into(),
        }
    }

    pub fn role(&self) -> ActorRole {
        match self {
            Self::Citizen { .. } => ActorRole::Citizen,
            Self::AuthorityHandler { .. } => ActorRole::AuthorityHandler,
            Self::AuthorityAdmin { .. } => ActorRole::AuthorityAdmin,
            Self::System => ActorRole::System,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Citizen { id }
            | Self::AuthorityHandler { id, .. }
            | Self::AuthorityAdmin { id, .. } => Some(id.as_str()),
            Self::System => None,
        }
    }

    /// Office the actor works for, if any
    pub fn authority_id(&self) -> Option<&str> {
        match self {
            Self::AuthorityHandler { authority_id, .. }
            | Self::AuthorityAdmin { authority_id, .. } => Some(authority_id.as_str()),
            _ => None,
        }
    }
}

/// Lifecycle action names, used in the permission table and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    File,
    Acknowledge,
    Assign,
    RequestInfo,
    ProvideInfo,
    Resolve,
    Accept,
    Dispute,
    Forward,
    Escalate,
    AuthorityEscalate,
    AutoClose,
    Withdraw,
    Archive,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Acknowledge => "acknowledge",
            Self::Assign => "assign",
            Self::RequestInfo => "request_info",
            Self::ProvideInfo => "provide_info",
            Self::Resolve => "resolve",
            Self::Accept => "accept",
            Self::Dispute => "dispute",
            Self::Forward => "forward",
            Self::Escalate => "escalate",
            Self::AuthorityEscalate => "authority_escalate",
            Self::AutoClose => "auto_close",
            Self::Withdraw => "withdraw",
            Self::Archive => "archive",
        };
        write!(f, "{name}")
    }
}

/// A transition request on an existing grievance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    Acknowledge,
    Assign { assignee_id: String },
    RequestInfo,
    ProvideInfo,
    Resolve,
    Accept,
    Dispute,
    Forward { to_authority_id: AuthorityId },
    Escalate,
    AuthorityEscalate,
    AutoClose,
    Withdraw,
    Archive,
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Self::Acknowledge => Action::Acknowledge,
            Self::Assign { .. } => Action::Assign,
            Self::RequestInfo => Action::RequestInfo,
            Self::ProvideInfo => Action::ProvideInfo,
            Self::Resolve => Action::Resolve,
            Self::Accept => Action::Accept,
            Self::Dispute => Action::Dispute,
            Self::Forward { .. } => Action::Forward,
            Self::Escalate => Action::Escalate,
            Self::AuthorityEscalate => Action::AuthorityEscalate,
            Self::AutoClose => Action::AutoClose,
            Self::Withdraw => Action::Withdraw,
            Self::Archive => Action::Archive,
        }
    }
}

/// Event-shaped payload accompanying every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub actor: Actor,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl ActionRequest {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            note: None,
            attachments: Vec::new(),
        }
    }

    /// Request issued by the deadline sweep
    pub fn system() -> Self {
        Self::new(Actor::System)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = attachments;
        self
    }
}
