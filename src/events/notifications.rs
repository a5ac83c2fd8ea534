//! # Notification Sink
//!
//! Customer and operations notifications for milestone transitions. Like the
//! audit trail, notification delivery is fire-and-forget: the status change
//! has already committed by the time the sink runs, and a sink failure never
//! rolls it back.

use super::publisher::EventPublisher;
use super::SinkError;
use crate::state_machine::NotificationEvent;
use async_trait::async_trait;

/// Downstream notification port
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), SinkError>;
}

/// Notification sink backed by the broadcast publisher
#[derive(Debug, Clone, Default)]
pub struct BroadcastNotificationSink {
    publisher: EventPublisher,
}

impl BroadcastNotificationSink {
    pub fn new(publisher: EventPublisher) -> Self {
        Self { publisher }
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }
}

#[async_trait]
impl NotificationSink for BroadcastNotificationSink {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), SinkError> {
        self.publisher.publish_notification(event);
        Ok(())
    }
}

/// Notification sink that drops every event, for embedders that opt out
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotificationSink;

#[async_trait]
impl NotificationSink for NullNotificationSink {
    async fn notify(&self, _event: &NotificationEvent) -> Result<(), SinkError> {
        Ok(())
    }
}
