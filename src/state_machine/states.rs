use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status definitions for the fulfillment lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Initial state while the order awaits operator approval
    AwaitingApproval,
    /// Operator confirmed the order for fulfillment
    Confirmed,
    /// Warehouse is packing the order (owned by the packing workflow)
    Packing,
    /// Packed and waiting for a driver
    ReadyForDelivery,
    /// A driver has claimed the order and is on the road
    OutForDelivery,
    /// Delivery completed
    Delivered,
    /// Order was cancelled
    Cancelled,
}

impl OrderStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Check if a driver claim may legitimately be held in this state
    pub fn can_hold_driver(&self) -> bool {
        matches!(self, Self::ReadyForDelivery | Self::OutForDelivery)
    }

    /// Check if the admin mark-delivered action applies from this state
    pub fn is_deliverable(&self) -> bool {
        matches!(self, Self::ReadyForDelivery | Self::OutForDelivery)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingApproval => write!(f, "awaiting_approval"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Packing => write!(f, "packing"),
            Self::ReadyForDelivery => write!(f, "ready_for_delivery"),
            Self::OutForDelivery => write!(f, "out_for_delivery"),
            Self::Delivered => write!(f, "delivered"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_approval" => Ok(Self::AwaitingApproval),
            "confirmed" => Ok(Self::Confirmed),
            "packing" => Ok(Self::Packing),
            "ready_for_delivery" => Ok(Self::ReadyForDelivery),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid order status: {s}")),
        }
    }
}

/// Default state for newly created orders
impl Default for OrderStatus {
    fn default() -> Self {
        Self::AwaitingApproval
    }
}

/// Backorder decision sub-state attached to awaiting-approval orders.
///
/// Derived from the presence of a stock shortfall and its resolution record,
/// never stored as its own column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackorderDecision {
    /// No shortfall was ever reported
    None,
    /// Shortfall reported, decision outstanding
    PendingApproval,
    /// All affected items approved at requested quantity
    Approved,
    /// Approved with reduced per-item quantities
    PartialApproved,
    /// Backorder rejected by an operator
    Rejected,
}

impl BackorderDecision {
    /// Check if this decision blocks order confirmation
    pub fn blocks_confirmation(&self) -> bool {
        matches!(self, Self::PendingApproval)
    }

    /// Check if the backorder sub-flow has been resolved
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Approved | Self::PartialApproved | Self::Rejected)
    }
}

impl fmt::Display for BackorderDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::PendingApproval => write!(f, "pending_approval"),
            Self::Approved => write!(f, "approved"),
            Self::PartialApproved => write!(f, "partial_approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Orders with no shortfall never entered the backorder sub-flow
impl Default for BackorderDecision {
    fn default() -> Self {
        Self::None
    }
}
