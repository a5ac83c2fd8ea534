//! Lifecycle events emitted after successful transitions.
//!
//! Each variant maps to one of the notification triggers consumed by the
//! downstream email/invoice workers. Events are emitted best-effort after the
//! conditional write commits; they never gate the transition itself.

use crate::constants::events;
use crate::models::{AreaId, DriverId, OrderId, ProductId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Typed lifecycle event for the notification sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    OrderConfirmed {
        order_id: OrderId,
        order_number: String,
        customer_name: String,
    },
    OutForDelivery {
        order_id: OrderId,
        order_number: String,
        customer_name: String,
        driver_id: DriverId,
        driver_name: Option<String>,
    },
    Delivered {
        order_id: OrderId,
        order_number: String,
        customer_name: String,
        delivered_at: DateTime<Utc>,
    },
    ReturnedToWarehouse {
        order_id: OrderId,
        order_number: String,
        driver_id: DriverId,
        reason: String,
    },
    BackorderApproved {
        order_id: OrderId,
        order_number: String,
        estimated_fulfillment: Option<NaiveDate>,
    },
    BackorderPartiallyApproved {
        order_id: OrderId,
        order_number: String,
        approved_quantities: BTreeMap<ProductId, u32>,
    },
    BackorderRejected {
        order_id: OrderId,
        order_number: String,
        reason: String,
    },
}

impl NotificationEvent {
    /// Wire-level event name used on the broadcast channel
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderConfirmed { .. } => events::ORDER_CONFIRMED,
            Self::OutForDelivery { .. } => events::ORDER_OUT_FOR_DELIVERY,
            Self::Delivered { .. } => events::ORDER_DELIVERED,
            Self::ReturnedToWarehouse { .. } => events::ORDER_RETURNED_TO_WAREHOUSE,
            Self::BackorderApproved { .. } => events::BACKORDER_APPROVED,
            Self::BackorderPartiallyApproved { .. } => events::BACKORDER_PARTIALLY_APPROVED,
            Self::BackorderRejected { .. } => events::BACKORDER_REJECTED,
        }
    }

    /// Order the event refers to
    pub fn order_id(&self) -> OrderId {
        match self {
            Self::OrderConfirmed { order_id, .. }
            | Self::OutForDelivery { order_id, .. }
            | Self::Delivered { order_id, .. }
            | Self::ReturnedToWarehouse { order_id, .. }
            | Self::BackorderApproved { order_id, .. }
            | Self::BackorderPartiallyApproved { order_id, .. }
            | Self::BackorderRejected { order_id, .. } => *order_id,
        }
    }

    /// JSON payload for transports that carry untyped contexts
    pub fn context(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

/// Summary of a driver assignment change, carried on audit records so a
/// reassignment remains traceable to the driver it displaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverChange {
    pub order_id: OrderId,
    pub driver_id: DriverId,
    pub previous_driver_id: Option<DriverId>,
    pub area_id: Option<AreaId>,
}
