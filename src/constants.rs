//! # System Constants
//!
//! Event names, audit action names, and operational boundaries shared across
//! the fulfillment core. Event name strings are the stable wire contract with
//! downstream notification consumers; change them only with coordination.

// Re-export state types for convenience
pub use crate::state_machine::{BackorderDecision, OrderStatus};

/// Notification event names published to downstream consumers
pub mod events {
    // Order lifecycle events
    pub const ORDER_CONFIRMED: &str = "order.confirmed";
    pub const ORDER_OUT_FOR_DELIVERY: &str = "order.out_for_delivery";
    pub const ORDER_DELIVERED: &str = "order.delivered";
    pub const ORDER_RETURNED_TO_WAREHOUSE: &str = "order.returned_to_warehouse";

    // Backorder sub-flow events
    pub const BACKORDER_APPROVED: &str = "backorder.approved";
    pub const BACKORDER_PARTIALLY_APPROVED: &str = "backorder.partially_approved";
    pub const BACKORDER_REJECTED: &str = "backorder.rejected";
}

/// Audit trail action names recorded for every applied mutation
pub mod audit {
    pub const ORDER_CREATED: &str = "order.created";
    pub const STATUS_CHANGED: &str = "order.status_changed";
    pub const BACKORDER_DECIDED: &str = "order.backorder_decided";
    pub const DRIVER_ASSIGNED: &str = "order.driver_assigned";
    pub const DELIVERY_STARTED: &str = "order.delivery_started";
    pub const PROOF_UPLOADED: &str = "order.proof_uploaded";
    pub const DRIVER_AREAS_REPLACED: &str = "driver.areas_replaced";
    pub const AUTO_ASSIGN_COMPLETED: &str = "orders.auto_assign_completed";
}

/// System-wide constants
pub mod system {
    /// Shortest acceptable backorder rejection reason, in characters
    pub const MIN_REJECTION_REASON_LEN: usize = 10;

    /// Default GST rate applied when recomputing totals
    pub const DEFAULT_GST_RATE: f64 = 0.15;

    /// Default wall-clock budget for one auto-assignment run
    pub const DEFAULT_AUTO_ASSIGN_TIMEOUT_SECS: u64 = 30;

    /// Each driver covers at most one delivery area
    pub const MAX_AREAS_PER_DRIVER: usize = 1;
}

/// Status groupings for predicate construction and validation
pub mod status_groups {
    use super::OrderStatus;

    /// Statuses from which an order can be cancelled without the
    /// delivered-order override
    pub const CANCELLABLE_STATUSES: &[OrderStatus] = &[
        OrderStatus::AwaitingApproval,
        OrderStatus::Confirmed,
        OrderStatus::Packing,
        OrderStatus::ReadyForDelivery,
        OrderStatus::OutForDelivery,
    ];

    /// Statuses in which a driver may be assigned or reassigned
    pub const DRIVER_ASSIGNABLE_STATUSES: &[OrderStatus] =
        &[OrderStatus::ReadyForDelivery, OrderStatus::OutForDelivery];

    /// Statuses that indicate the order is still moving through fulfillment
    pub const ACTIVE_STATUSES: &[OrderStatus] = &[
        OrderStatus::AwaitingApproval,
        OrderStatus::Confirmed,
        OrderStatus::Packing,
        OrderStatus::ReadyForDelivery,
        OrderStatus::OutForDelivery,
    ];
}
