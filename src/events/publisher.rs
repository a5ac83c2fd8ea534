//! Broadcast fan-out for the audit trail and lifecycle notifications.
//!
//! The publisher accepts the crate's typed payloads directly and owns the
//! envelope conversion, so subscribers see one uniform stream whichever sink
//! produced the event. Sending with no subscribers is fine; the event is
//! simply dropped.

use super::audit::AuditRecord;
use crate::state_machine::NotificationEvent;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

/// Broadcast publisher shared by the audit and notification sinks
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Envelope delivered to subscribers: the wire-level event name, the JSON
/// payload of the originating record, and when it was published.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub context: Value,
    pub published_at: DateTime<Utc>,
}

impl PublishedEvent {
    fn from_notification(event: &NotificationEvent) -> Self {
        Self {
            name: event.name().to_string(),
            context: event.context(),
            published_at: Utc::now(),
        }
    }

    fn from_audit(record: &AuditRecord) -> Result<Self, serde_json::Error> {
        Ok(Self {
            name: record.action.clone(),
            context: serde_json::to_value(record)?,
            published_at: Utc::now(),
        })
    }
}

impl EventPublisher {
    /// Create a publisher with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Fan a lifecycle notification out to every subscriber
    pub fn publish_notification(&self, event: &NotificationEvent) {
        self.send(PublishedEvent::from_notification(event));
    }

    /// Fan an audit record out to every subscriber, keyed by its action name
    pub fn publish_audit(&self, record: &AuditRecord) -> Result<(), serde_json::Error> {
        self.send(PublishedEvent::from_audit(record)?);
        Ok(())
    }

    fn send(&self, event: PublishedEvent) {
        // A send error only means nobody is listening right now
        let _ = self.sender.send(event);
    }

    /// Subscribe to the combined audit and notification stream
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
