//! # Fulfillment Services
//!
//! The service layer over the storage port: `OrderLifecycle` owns the
//! order-level guarded transitions, `DeliveryAssignment` owns driver claims
//! and area coverage, and `FulfillmentSystem` wires both behind the
//! capability check. Every operation follows the same shape: load, validate
//! business rules, check the transition guard, run the conditional update,
//! classify a non-applied outcome from the returned snapshot, then emit
//! audit and notification events best-effort.

pub mod auto_assign;
pub mod delivery_assignment;
pub mod order_lifecycle;
pub mod system;

pub use auto_assign::{plan_assignments, AssignmentPlan, AssignmentReport, PlannedAssignment};
pub use delivery_assignment::DeliveryAssignment;
pub use order_lifecycle::{
    BackorderApproval, CancelOptions, MarkDeliveredOptions, OrderLifecycle,
};
pub use system::{FulfillmentSystem, NewOrder};

use crate::events::{AuditRecord, AuditSink, NotificationSink};
use crate::state_machine::NotificationEvent;
use std::sync::Arc;
use tracing::warn;

/// Record an audit entry, logging instead of failing the finished mutation
pub(crate) async fn emit_audit(sink: &Arc<dyn AuditSink>, record: AuditRecord) {
    let action = record.action.clone();
    if let Err(e) = sink.record(record).await {
        warn!(action = %action, error = %e, "Audit sink failed; mutation already committed");
    }
}

/// Deliver a lifecycle notification, logging instead of failing the transition
pub(crate) async fn emit_notification(sink: &Arc<dyn NotificationSink>, event: &NotificationEvent) {
    if let Err(e) = sink.notify(event).await {
        warn!(
            event = event.name(),
            order_id = %event.order_id(),
            error = %e,
            "Notification sink failed; transition already committed"
        );
    }
}
