//! Broadcast notifier
//!
//! Publishes [`StatusChange`] messages on a Tokio broadcast channel. Delivery
//! adapters subscribe and forward to their own channels.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::{Notifier, NotifyResult, StatusChange};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Notifier backed by a broadcast channel
pub struct EventBus {
    sender: broadcast::Sender<StatusChange>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish a change to all subscribers
    pub fn publish(&self, change: StatusChange) {
        let grievance_id = change.grievance_id.clone();
        let event = change.event_type;
        match self.sender.send(change) {
            Ok(count) => {
                debug!(%grievance_id, %event, receivers = count, "Status change published");
            }
            Err(_) => {
                // No receivers is OK
                debug!(%grievance_id, %event, "Status change published (no receivers)");
            }
        }
    }

    /// Subscribe to receive status changes
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for EventBus {
    async fn notify(&self, change: StatusChange) -> NotifyResult<()> {
        self.publish(change);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grievance::{EventType, GrievanceStatus};
    use crate::lifecycle::access::ActorRole;
    use chrono::Utc;

    fn change() -> StatusChange {
        StatusChange {
            grievance_id: "g-1".to_string(),
            event_type: EventType::RequestInfo,
            status: GrievanceStatus::InfoRequested,
            recipient: ActorRole::Citizen,
            authority_id: "L0".to_string(),
            citizen_id: "c-1".to_string(),
            version: 2,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.notify(change()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.grievance_id, "g-1");
        assert_eq!(received.recipient, ActorRole::Citizen);
    }

    #[tokio::test]
    async fn test_no_subscribers_is_ok() {
        let bus = EventBus::new();
        assert!(bus.notify(change()).await.is_ok());
    }
}
