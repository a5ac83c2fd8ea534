//! # Order Model
//!
//! The aggregate root of the fulfillment core. An order owns its status, its
//! append-only status history, the embedded delivery sub-record, and the
//! backorder bookkeeping. Nothing outside the lifecycle and assignment
//! services mutates an order, and every status change appends exactly one
//! history entry in the same atomic write as the status itself.
//!
//! ## Versioning
//!
//! `version` increases on every successful write and backs the optimistic
//! concurrency guard for mutations that are not status-guarded (driver
//! reassignment). The store increments it; mutations never touch it directly.
//!
//! ## Backorder sub-state
//!
//! The backorder decision is derived, never stored: a present
//! `stock_shortfall` with no resolution reads as pending, a resolution record
//! carries the final decision. Clearing semantics are owned by the lifecycle
//! operations.

use crate::models::actor::ActorRef;
use crate::models::delivery::{DeliveryDetails, PackingDetails};
use crate::models::driver_area::AreaId;
use crate::state_machine::states::{BackorderDecision, OrderStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unique order identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Product identifier (SKU) from the catalogue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single order line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl OrderItem {
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        quantity: u32,
        unit_price_cents: i64,
    ) -> Self {
        Self {
            product_id: ProductId::new(product_id),
            name: name.into(),
            quantity,
            unit_price_cents,
        }
    }

    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

/// Order money totals, all in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal_cents: i64,
    pub gst_cents: i64,
    pub total_cents: i64,
}

impl OrderTotals {
    /// Recompute from the current lines at the given GST rate
    pub fn compute(items: &[OrderItem], gst_rate: f64) -> Self {
        let subtotal_cents: i64 = items.iter().map(OrderItem::line_total_cents).sum();
        let gst_cents = ((subtotal_cents as f64) * gst_rate).round() as i64;
        Self {
            subtotal_cents,
            gst_cents,
            total_cents: subtotal_cents + gst_cents,
        }
    }
}

/// One entry in the append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub changed_at: DateTime<Utc>,
    pub changed_by: ActorRef,
    pub notes: Option<String>,
}

/// One product line the warehouse cannot fill at the requested quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortfallItem {
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
}

/// Stock shortfall reported by the inventory workflow; its presence puts the
/// order into the pending-approval backorder sub-state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub items: Vec<ShortfallItem>,
    pub reported_at: DateTime<Utc>,
}

impl StockShortfall {
    pub fn new(items: Vec<ShortfallItem>) -> Self {
        Self {
            items,
            reported_at: Utc::now(),
        }
    }

    /// Available stock for a product, if that product is short
    pub fn available_for(&self, product_id: &ProductId) -> Option<u32> {
        self.items
            .iter()
            .find(|item| &item.product_id == product_id)
            .map(|item| item.available)
    }
}

/// Outcome of the backorder sub-flow, recorded when an operator decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackorderResolution {
    pub decision: BackorderDecision,
    pub approved_quantities: Option<BTreeMap<ProductId, u32>>,
    pub estimated_fulfillment: Option<NaiveDate>,
    pub notes: Option<String>,
    pub decided_by: ActorRef,
    pub decided_at: DateTime<Utc>,
}

impl BackorderResolution {
    pub fn approved(
        decided_by: ActorRef,
        estimated_fulfillment: Option<NaiveDate>,
        notes: Option<String>,
    ) -> Self {
        Self {
            decision: BackorderDecision::Approved,
            approved_quantities: None,
            estimated_fulfillment,
            notes,
            decided_by,
            decided_at: Utc::now(),
        }
    }

    pub fn partially_approved(
        decided_by: ActorRef,
        approved_quantities: BTreeMap<ProductId, u32>,
        estimated_fulfillment: Option<NaiveDate>,
        notes: Option<String>,
    ) -> Self {
        Self {
            decision: BackorderDecision::PartialApproved,
            approved_quantities: Some(approved_quantities),
            estimated_fulfillment,
            notes,
            decided_by,
            decided_at: Utc::now(),
        }
    }

    pub fn rejected(decided_by: ActorRef, reason: String) -> Self {
        Self {
            decision: BackorderDecision::Rejected,
            approved_quantities: None,
            estimated_fulfillment: None,
            notes: Some(reason),
            decided_by,
            decided_at: Utc::now(),
        }
    }
}

/// The order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Human-facing reference carried on every notification
    pub order_number: String,
    pub customer_name: String,
    /// Delivery zone this order falls into, when known
    pub area_id: Option<AreaId>,
    /// Scheduled delivery date used by auto-assignment
    pub delivery_date: Option<NaiveDate>,
    pub status: OrderStatus,
    /// Optimistic concurrency guard; the store increments it on every write
    pub version: i64,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub status_history: Vec<StatusHistoryEntry>,
    pub delivery: DeliveryDetails,
    pub packing: PackingDetails,
    pub stock_shortfall: Option<StockShortfall>,
    pub backorder_resolution: Option<BackorderResolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order in `awaiting_approval` with a seeded history entry.
    pub fn new(
        order_number: impl Into<String>,
        customer_name: impl Into<String>,
        items: Vec<OrderItem>,
        gst_rate: f64,
        created_by: &ActorRef,
    ) -> Self {
        let now = Utc::now();
        let totals = OrderTotals::compute(&items, gst_rate);
        Self {
            id: OrderId::new(),
            order_number: order_number.into(),
            customer_name: customer_name.into(),
            area_id: None,
            delivery_date: None,
            status: OrderStatus::AwaitingApproval,
            version: 1,
            items,
            totals,
            status_history: vec![StatusHistoryEntry {
                status: OrderStatus::AwaitingApproval,
                changed_at: now,
                changed_by: created_by.clone(),
                notes: Some("Order created".to_string()),
            }],
            delivery: DeliveryDetails::default(),
            packing: PackingDetails::default(),
            stock_shortfall: None,
            backorder_resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive the backorder decision from the shortfall/resolution pair
    pub fn backorder_decision(&self) -> BackorderDecision {
        if let Some(resolution) = &self.backorder_resolution {
            resolution.decision
        } else if self.stock_shortfall.is_some() {
            BackorderDecision::PendingApproval
        } else {
            BackorderDecision::None
        }
    }

    pub fn has_pending_backorder(&self) -> bool {
        self.backorder_decision().blocks_confirmation()
    }

    /// Move to a new status and append the matching history entry.
    ///
    /// This is the only way status changes; callers run it inside a
    /// conditional update so the pair lands atomically.
    pub fn transition_to(
        &mut self,
        status: OrderStatus,
        actor: &ActorRef,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.status_history.push(StatusHistoryEntry {
            status,
            changed_at: now,
            changed_by: actor.clone(),
            notes,
        });
        self.updated_at = now;
    }

    /// Append an informational history entry at the current status
    pub fn append_history_note(
        &mut self,
        actor: &ActorRef,
        notes: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.status_history.push(StatusHistoryEntry {
            status: self.status,
            changed_at: now,
            changed_by: actor.clone(),
            notes: Some(notes.into()),
        });
        self.updated_at = now;
    }

    /// Recompute money totals from the current lines
    pub fn recompute_totals(&mut self, gst_rate: f64) {
        self.totals = OrderTotals::compute(&self.items, gst_rate);
    }

    /// Record a shortfall reported by the inventory workflow
    pub fn report_shortfall(&mut self, shortfall: StockShortfall) {
        self.stock_shortfall = Some(shortfall);
        self.backorder_resolution = None;
    }

    /// Requested quantity for a product, if the order carries it
    pub fn requested_quantity(&self, product_id: &ProductId) -> Option<u32> {
        self.items
            .iter()
            .find(|item| &item.product_id == product_id)
            .map(|item| item.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::actor::{Actor, ActorRole};

    fn admin_ref() -> ActorRef {
        Actor::new("user_admin", "Dana Ropata", None, ActorRole::Admin).as_ref()
    }

    fn sample_items() -> Vec<OrderItem> {
        vec![
            OrderItem::new("sku-flour", "Flour 10kg", 10, 2_500),
            OrderItem::new("sku-oil", "Canola Oil 5L", 2, 1_800),
        ]
    }

    #[test]
    fn test_new_order_seeds_history() {
        let order = Order::new("ORD-1001", "Harbour Cafe", sample_items(), 0.15, &admin_ref());

        assert_eq!(order.status, OrderStatus::AwaitingApproval);
        assert_eq!(order.version, 1);
        assert_eq!(order.status_history.len(), 1);
        assert_eq!(order.status_history[0].status, OrderStatus::AwaitingApproval);
    }

    #[test]
    fn test_totals_include_gst() {
        let order = Order::new("ORD-1002", "Harbour Cafe", sample_items(), 0.15, &admin_ref());

        // 10 * 2500 + 2 * 1800 = 28_600; GST at 15% = 4_290
        assert_eq!(order.totals.subtotal_cents, 28_600);
        assert_eq!(order.totals.gst_cents, 4_290);
        assert_eq!(order.totals.total_cents, 32_890);
    }

    #[test]
    fn test_transition_appends_matching_history() {
        let mut order = Order::new("ORD-1003", "Harbour Cafe", sample_items(), 0.15, &admin_ref());
        order.transition_to(
            OrderStatus::Confirmed,
            &admin_ref(),
            Some("confirmed by phone".to_string()),
            Utc::now(),
        );

        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.status_history.len(), 2);
        let last = order.status_history.last().unwrap();
        assert_eq!(last.status, OrderStatus::Confirmed);
        assert_eq!(last.notes.as_deref(), Some("confirmed by phone"));
    }

    #[test]
    fn test_backorder_decision_is_derived() {
        let mut order = Order::new("ORD-1004", "Harbour Cafe", sample_items(), 0.15, &admin_ref());
        assert_eq!(order.backorder_decision(), BackorderDecision::None);

        order.report_shortfall(StockShortfall::new(vec![ShortfallItem {
            product_id: ProductId::new("sku-flour"),
            requested: 10,
            available: 4,
        }]));
        assert_eq!(order.backorder_decision(), BackorderDecision::PendingApproval);
        assert!(order.has_pending_backorder());

        order.stock_shortfall = None;
        order.backorder_resolution = Some(BackorderResolution::rejected(
            admin_ref(),
            "supplier discontinued the line".to_string(),
        ));
        assert_eq!(order.backorder_decision(), BackorderDecision::Rejected);
        assert!(!order.has_pending_backorder());
    }

    #[test]
    fn test_recompute_totals_after_quantity_change() {
        let mut order = Order::new("ORD-1005", "Harbour Cafe", sample_items(), 0.15, &admin_ref());
        order.items[0].quantity = 5;
        order.recompute_totals(0.15);

        // 5 * 2500 + 2 * 1800 = 16_100; GST = 2_415
        assert_eq!(order.totals.subtotal_cents, 16_100);
        assert_eq!(order.totals.gst_cents, 2_415);
        assert_eq!(order.totals.total_cents, 18_515);
    }
}
