//! Notification collaborator
//!
//! After a transition commits the service tells the [`Notifier`] who should
//! hear about it. Delivery channels (push, SMS, e-mail) sit behind the trait.

pub mod bus;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::AuthorityId;
use crate::grievance::{EventType, Grievance, GrievanceId, GrievanceStatus};
use crate::lifecycle::access::ActorRole;

pub use bus::{EventBus, SharedEventBus};

/// Error type for notifier operations
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to deliver notification: {0}")]
    DeliveryFailed(String),

    #[error("Notifier unavailable: {0}")]
    Unavailable(String),
}

/// Result type for notifier operations
pub type NotifyResult<T> = Result<T, NotifyError>;

/// A committed status change and the party it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub grievance_id: GrievanceId,
    pub event_type: EventType,
    pub status: GrievanceStatus,
    pub recipient: ActorRole,
    /// Office owning the case after the change
    pub authority_id: AuthorityId,
    pub citizen_id: String,
    pub version: u64,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    /// Build the notification for the latest event on `grievance`
    pub fn from_latest(grievance: &Grievance) -> Option<Self> {
        let event = grievance.last_event()?;
        Some(Self {
            grievance_id: grievance.id.clone(),
            event_type: event.event_type,
            status: grievance.status,
            recipient: recipient_for(event.event_type),
            authority_id: grievance.authority_id.clone(),
            citizen_id: grievance.citizen_id.clone(),
            version: grievance.version,
            at: event.at,
        })
    }
}

/// Who is told about an event
pub fn recipient_for(event_type: EventType) -> ActorRole {
    match event_type {
        EventType::Submit
        | EventType::InfoProvided
        | EventType::Dispute
        | EventType::Accept
        | EventType::Withdraw => ActorRole::AuthorityHandler,
        EventType::AuthorityEscalate => ActorRole::AuthorityAdmin,
        EventType::Ack
        | EventType::Assign
        | EventType::RequestInfo
        | EventType::Forward
        | EventType::Resolve
        | EventType::Escalate
        | EventType::AutoClose
        | EventType::Archive => ActorRole::Citizen,
    }
}

/// Notification collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, change: StatusChange) -> NotifyResult<()>;
}

/// Shared reference to a notifier
pub type SharedNotifier = Arc<dyn Notifier>;
