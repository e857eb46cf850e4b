//! Grievance record, status set and append-only history
//!
//! `status`, `authority_id` and `escalation_level` are the current
//! projection; `history` is the audit log. Records change only through the
//! lifecycle engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::{AuthorityId, DepartmentId};
use crate::lifecycle::access::ActorRole;

/// Unique identifier for grievances
pub type GrievanceId = String;

/// Opaque reference to an attachment held by the file store
pub type AttachmentRef = String;

/// Lifecycle status of a grievance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrievanceStatus {
    /// Filed, waiting for the office to pick it up
    Submitted,
    /// Office is working the case
    UnderReview,
    /// Office asked the citizen for more information
    InfoRequested,
    /// Office proposed a resolution; citizen must accept or dispute
    ResolvedPendingConfirm,
    /// Moved up one level of the escalation chain
    Escalated,
    /// Office failed to respond; case sits in its administrator's queue
    AuthorityEscalated,
    /// Citizen accepted the resolution
    ClosedAccepted,
    /// Citizen never confirmed a resolution
    ClosedAuto,
    /// Citizen never supplied requested information
    ClosedNoResponse,
    /// Citizen withdrew the grievance
    Withdrawn,
    /// Administratively archived after closure
    Archived,
}

impl GrievanceStatus {
    /// Whether this status accepts no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ClosedAccepted
                | Self::ClosedAuto
                | Self::ClosedNoResponse
                | Self::Withdrawn
                | Self::Archived
        )
    }

    /// Closed statuses that may still be archived
    pub fn is_archivable(self) -> bool {
        self.is_terminal() && self != Self::Archived
    }

    /// Whether the owning office is expected to act
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::UnderReview | Self::Escalated | Self::AuthorityEscalated
        )
    }

    /// Whether the citizen is expected to act
    pub fn awaits_citizen(self) -> bool {
        matches!(self, Self::InfoRequested | Self::ResolvedPendingConfirm)
    }

    /// All statuses
    pub fn all() -> &'static [GrievanceStatus] {
        &[
            Self::Submitted,
            Self::UnderReview,
            Self::InfoRequested,
            Self::ResolvedPendingConfirm,
            Self::Escalated,
            Self::AuthorityEscalated,
            Self::ClosedAccepted,
            Self::ClosedAuto,
            Self::ClosedNoResponse,
            Self::Withdrawn,
            Self::Archived,
        ]
    }
}

impl std::fmt::Display for GrievanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::UnderReview => write!(f, "UNDER_REVIEW"),
            Self::InfoRequested => write!(f, "INFO_REQUESTED"),
            Self::ResolvedPendingConfirm => write!(f, "RESOLVED_PENDING_CONFIRM"),
            Self::Escalated => write!(f, "ESCALATED"),
            Self::AuthorityEscalated => write!(f, "AUTHORITY_ESCALATED"),
            Self::ClosedAccepted => write!(f, "CLOSED_ACCEPTED"),
            Self::ClosedAuto => write!(f, "CLOSED_AUTO"),
            Self::ClosedNoResponse => write!(f, "CLOSED_NO_RESPONSE"),
            Self::Withdrawn => write!(f, "WITHDRAWN"),
            Self::Archived => write!(f, "ARCHIVED"),
        }
    }
}

/// Kind of history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Submit,
    Ack,
    RequestInfo,
    InfoProvided,
    Forward,
    Assign,
    Resolve,
    Dispute,
    Accept,
    Escalate,
    AuthorityEscalate,
    AutoClose,
    Withdraw,
    Archive,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Submit => "SUBMIT",
            Self::Ack => "ACK",
            Self::RequestInfo => "REQUEST_INFO",
            Self::InfoProvided => "INFO_PROVIDED",
            Self::Forward => "FORWARD",
            Self::Assign => "ASSIGN",
            Self::Resolve => "RESOLVE",
            Self::Dispute => "DISPUTE",
            Self::Accept => "ACCEPT",
            Self::Escalate => "ESCALATE",
            Self::AuthorityEscalate => "AUTHORITY_ESCALATE",
            Self::AutoClose => "AUTO_CLOSE",
            Self::Withdraw => "WITHDRAW",
            Self::Archive => "ARCHIVE",
        };
        write!(f, "{name}")
    }
}

/// One immutable history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrievanceEvent {
    pub event_type: EventType,
    pub at: DateTime<Utc>,
    pub by_role: ActorRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Destination office for FORWARD / ESCALATE / AUTHORITY_ESCALATE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_authority_id: Option<AuthorityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRef>,
    /// Status before this event (`None` for SUBMIT)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<GrievanceStatus>,
    pub to_status: GrievanceStatus,
}

/// Privacy flags chosen by the citizen at filing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privacy {
    /// Hide the citizen's identity from handling offices
    #[serde(default)]
    pub anonymous: bool,
    /// Exclude from public statistics and listings
    #[serde(default)]
    pub confidential: bool,
}

/// Filing payload. A draft until it is filed; never stored on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGrievance {
    pub citizen_id: String,
    /// Empty when the citizen asks for assisted categorization
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub department_id: DepartmentId,
    pub subject: String,
    pub description: String,
    #[serde(default)]
    pub desired_outcome: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    #[serde(default)]
    pub privacy: Privacy,
}

impl NewGrievance {
    pub fn new(
        citizen_id: impl Into<String>,
        subject: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            citizen_id: citizen_id.into(),
            subject: subject.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_category(
        mut self,
        category: impl Into<String>,
        department_id: impl Into<DepartmentId>,
    ) -> Self {
        self.category = category.into();
        self.department_id = department_id.into();
        self
    }

    pub fn with_desired_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.desired_outcome = Some(outcome.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = privacy;
        self
    }

    /// Whether category and department still need to be chosen
    pub fn needs_categorization(&self) -> bool {
        self.category.trim().is_empty() || self.department_id.trim().is_empty()
    }
}

/// The mutable record under management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grievance {
    pub id: GrievanceId,
    pub citizen_id: String,
    pub category: String,
    pub department_id: DepartmentId,

    /// Office that currently owns the case
    pub authority_id: AuthorityId,
    /// Index into the rule's authority chain
    pub escalation_level: usize,
    /// Officer inside the owning office, if assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,

    pub subject: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_outcome: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    #[serde(default)]
    pub privacy: Privacy,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Entry time into the current status; anchor for all deadlines
    pub status_since: DateTime<Utc>,
    /// SLA window at the current escalation level
    pub sla_days: u32,

    pub status: GrievanceStatus,
    pub history: Vec<GrievanceEvent>,
    /// Number of committed transitions after filing
    #[serde(default)]
    pub version: u64,
}

impl Grievance {
    /// Generate a new grievance id
    pub fn new_id() -> GrievanceId {
        Uuid::new_v4().to_string()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn last_event(&self) -> Option<&GrievanceEvent> {
        self.history.last()
    }

    /// Timestamp for the next history entry.
    ///
    /// Never earlier than the last entry, so `at` stays non-decreasing even
    /// when the caller's clock lags.
    pub fn next_event_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.history.last() {
            Some(last) if last.at > now => last.at,
            _ => now,
        }
    }

    /// Check the structural invariants of the audit trail
    pub fn history_is_consistent(&self) -> bool {
        !self.history.is_empty()
            && self.history.windows(2).all(|w| w[0].at <= w[1].at)
            && self.history.first().map(|e| e.event_type) == Some(EventType::Submit)
            && self.history.last().map(|e| e.to_status) == Some(self.status)
    }

    /// Short summary for logging
    pub fn summary(&self) -> String {
        format!(
            "grievance={} status={} authority={} level={} events={}",
            self.id,
            self.status,
            self.authority_id,
            self.escalation_level,
            self.history.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_partition() {
        let terminal: Vec<_> = GrievanceStatus::all()
            .iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal.len(), 5);
        for status in GrievanceStatus::all() {
            assert!(!(status.is_terminal() && status.is_actionable()));
            assert!(!(status.is_terminal() && status.awaits_citizen()));
        }
        assert!(!GrievanceStatus::Archived.is_archivable());
        assert!(GrievanceStatus::Withdrawn.is_archivable());
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&GrievanceStatus::ResolvedPendingConfirm).unwrap();
        assert_eq!(json, "\"RESOLVED_PENDING_CONFIRM\"");
        assert_eq!(
            GrievanceStatus::ResolvedPendingConfirm.to_string(),
            "RESOLVED_PENDING_CONFIRM"
        );
        let event: EventType = serde_json::from_str("\"AUTHORITY_ESCALATE\"").unwrap();
        assert_eq!(event, EventType::AuthorityEscalate);
    }

    #[test]
    fn test_needs_categorization() {
        let draft = NewGrievance::new("c-1", "No water", "Three days without supply");
        assert!(draft.needs_categorization());
        let draft = draft.with_category("Utilities", "DPT-UTIL");
        assert!(!draft.needs_categorization());
    }
}
