//! # Events
//!
//! The broadcast publisher plus the two fire-and-forget sinks layered on it:
//! the audit trail and the notification stream. Services log and swallow sink
//! failures; a committed status change is never undone by a sink.

pub mod audit;
pub mod notifications;
pub mod publisher;

pub use audit::{AuditRecord, AuditSink, BroadcastAuditSink, TracingAuditSink};
pub use notifications::{BroadcastNotificationSink, NotificationSink, NullNotificationSink};
pub use publisher::{EventPublisher, PublishedEvent};

use thiserror::Error;

/// Error types for sink delivery
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
