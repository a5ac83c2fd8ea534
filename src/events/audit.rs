//! # Audit Sink
//!
//! Every applied mutation produces one audit record: who, what, and the
//! operation-specific details. Recording is fire-and-forget; a failed sink
//! is logged by the caller and never fails the operation it trails.

use super::publisher::EventPublisher;
use super::SinkError;
use crate::models::{ActorRef, OrderId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// One audit trail entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub action: String,
    pub order_id: Option<OrderId>,
    pub actor: ActorRef,
    pub details: Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(action: impl Into<String>, actor: ActorRef, details: Value) -> Self {
        Self {
            action: action.into(),
            order_id: None,
            actor,
            details,
            recorded_at: Utc::now(),
        }
    }

    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

/// Downstream audit trail port
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), SinkError>;
}

/// Audit sink backed by the broadcast publisher
#[derive(Debug, Clone, Default)]
pub struct BroadcastAuditSink {
    publisher: EventPublisher,
}

impl BroadcastAuditSink {
    pub fn new(publisher: EventPublisher) -> Self {
        Self { publisher }
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }
}

#[async_trait]
impl AuditSink for BroadcastAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), SinkError> {
        self.publisher.publish_audit(&record)?;
        Ok(())
    }
}

/// Audit sink that writes structured log lines instead of publishing.
///
/// Useful for embedders that only want the trail in their log pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), SinkError> {
        tracing::info!(
            action = %record.action,
            order_id = ?record.order_id,
            actor = %record.actor.id,
            details = %record.details,
            "audit"
        );
        Ok(())
    }
}
