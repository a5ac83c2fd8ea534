//! # Fulfillment System
//!
//! Wiring facade that owns the stores, the broadcast publisher, both
//! services, and the injected capability check. The facade is the
//! authorization boundary: it consults [`PermissionCheck`] before
//! dispatching, so the services themselves never re-check who is calling
//! (driver ownership checks are business rules, not authorization, and stay
//! in the services).

use crate::config::FulfillmentConfig;
use crate::constants::audit;
use crate::error::{conflict, forbidden, order_not_found, Result};
use crate::events::{
    AuditRecord, AuditSink, BroadcastAuditSink, BroadcastNotificationSink, EventPublisher,
    NotificationSink, PublishedEvent,
};
use crate::fulfillment::auto_assign::AssignmentReport;
use crate::fulfillment::order_lifecycle::{BackorderApproval, CancelOptions, MarkDeliveredOptions};
use crate::fulfillment::{DeliveryAssignment, OrderLifecycle};
use crate::models::{
    Actor, AreaId, DriverRef, Order, OrderId, OrderItem, ProofKind,
};
use crate::permissions::{Capability, PermissionCheck, StaticRolePermissions};
use crate::store::{DriverAreaStore, InMemoryStore, OrderStore, PgStore, StoreError};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Input for creating an order through the facade
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub area_id: Option<AreaId>,
    pub delivery_date: Option<NaiveDate>,
}

/// The assembled fulfillment core
pub struct FulfillmentSystem {
    config: FulfillmentConfig,
    publisher: EventPublisher,
    orders: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditSink>,
    permissions: Arc<dyn PermissionCheck>,
    lifecycle: OrderLifecycle,
    assignment: DeliveryAssignment,
}

impl FulfillmentSystem {
    /// Assemble with the embedded in-memory store and static role permissions
    pub fn in_memory(config: FulfillmentConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_stores(
            config,
            store.clone(),
            store,
            Arc::new(StaticRolePermissions),
        )
    }

    /// Assemble on a Postgres pool with static role permissions
    pub fn postgres(config: FulfillmentConfig, pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self::with_stores(
            config,
            store.clone(),
            store,
            Arc::new(StaticRolePermissions),
        )
    }

    /// Assemble from explicit store and permission implementations
    pub fn with_stores(
        config: FulfillmentConfig,
        orders: Arc<dyn OrderStore>,
        areas: Arc<dyn DriverAreaStore>,
        permissions: Arc<dyn PermissionCheck>,
    ) -> Self {
        let publisher = EventPublisher::new(config.events.channel_capacity);
        let audit_sink: Arc<dyn AuditSink> = Arc::new(BroadcastAuditSink::new(publisher.clone()));
        let notification_sink: Arc<dyn NotificationSink> =
            Arc::new(BroadcastNotificationSink::new(publisher.clone()));
        let lifecycle = OrderLifecycle::new(
            orders.clone(),
            audit_sink.clone(),
            notification_sink.clone(),
            config.clone(),
        );
        let assignment = DeliveryAssignment::new(
            orders.clone(),
            areas,
            audit_sink.clone(),
            notification_sink,
            config.clone(),
        );
        Self {
            config,
            publisher,
            orders,
            audit: audit_sink,
            permissions,
            lifecycle,
            assignment,
        }
    }

    pub fn config(&self) -> &FulfillmentConfig {
        &self.config
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Subscribe to the audit and notification event stream
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PublishedEvent> {
        self.publisher.subscribe()
    }

    pub fn lifecycle(&self) -> &OrderLifecycle {
        &self.lifecycle
    }

    pub fn assignment(&self) -> &DeliveryAssignment {
        &self.assignment
    }

    fn authorize(&self, actor: &Actor, capability: Capability) -> Result<()> {
        if self.permissions.has(actor, capability) {
            Ok(())
        } else {
            Err(forbidden(format!(
                "actor {} lacks the {capability} capability",
                actor.id
            )))
        }
    }

    /// Register a new order in `awaiting_approval`
    pub async fn create_order(&self, actor: &Actor, new_order: NewOrder) -> Result<Order> {
        self.authorize(actor, Capability::ManageOrders)?;
        crate::validation::validate_order_items(&new_order.items)?;

        let actor_ref = actor.as_ref();
        let mut order = Order::new(
            new_order.order_number,
            new_order.customer_name,
            new_order.items,
            self.config.pricing.gst_rate,
            &actor_ref,
        );
        order.area_id = new_order.area_id;
        order.delivery_date = new_order.delivery_date;

        match self.orders.insert(&order).await {
            Ok(()) => {}
            Err(StoreError::DuplicateId { id }) => {
                return Err(conflict(format!("order {id} already exists")));
            }
            Err(err) => return Err(err.into()),
        }

        info!(order_id = %order.id, order_number = %order.order_number, "Order created");
        crate::fulfillment::emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::ORDER_CREATED,
                actor_ref,
                json!({
                    "order_number": order.order_number,
                    "total_cents": order.totals.total_cents,
                }),
            )
            .for_order(order.id),
        )
        .await;
        Ok(order)
    }

    /// Fetch an order; no capability needed for reads
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))
    }

    // Order-level operations (ManageOrders)

    pub async fn confirm_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        notes: Option<String>,
    ) -> Result<Order> {
        self.authorize(actor, Capability::ManageOrders)?;
        self.lifecycle.confirm_order(actor, order_id, notes).await
    }

    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: &str,
        options: CancelOptions,
    ) -> Result<Order> {
        self.authorize(actor, Capability::ManageOrders)?;
        self.lifecycle
            .cancel_order(actor, order_id, reason, options)
            .await
    }

    pub async fn mark_delivered(
        &self,
        actor: &Actor,
        order_id: OrderId,
        notes: Option<String>,
        options: MarkDeliveredOptions,
    ) -> Result<Order> {
        self.authorize(actor, Capability::ManageOrders)?;
        self.lifecycle
            .mark_delivered(actor, order_id, notes, options)
            .await
    }

    pub async fn approve_backorder(
        &self,
        actor: &Actor,
        order_id: OrderId,
        approval: BackorderApproval,
    ) -> Result<Order> {
        self.authorize(actor, Capability::ManageOrders)?;
        self.lifecycle
            .approve_backorder(actor, order_id, approval)
            .await
    }

    pub async fn reject_backorder(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: &str,
    ) -> Result<Order> {
        self.authorize(actor, Capability::ManageOrders)?;
        self.lifecycle.reject_backorder(actor, order_id, reason).await
    }

    // Driver operations (DeliverOrders)

    pub async fn start_delivery(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        self.authorize(actor, Capability::DeliverOrders)?;
        self.assignment.start_delivery(actor, order_id).await
    }

    pub async fn upload_proof_of_delivery(
        &self,
        actor: &Actor,
        order_id: OrderId,
        kind: ProofKind,
        file_url: &str,
    ) -> Result<()> {
        self.authorize(actor, Capability::DeliverOrders)?;
        self.assignment
            .upload_proof_of_delivery(actor, order_id, kind, file_url)
            .await
    }

    pub async fn complete_delivery(
        &self,
        actor: &Actor,
        order_id: OrderId,
        notes: Option<String>,
    ) -> Result<Order> {
        self.authorize(actor, Capability::DeliverOrders)?;
        self.assignment.complete_delivery(actor, order_id, notes).await
    }

    pub async fn return_to_warehouse(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: &str,
        notes: Option<String>,
    ) -> Result<Order> {
        self.authorize(actor, Capability::DeliverOrders)?;
        self.assignment
            .return_to_warehouse(actor, order_id, reason, notes)
            .await
    }

    // Fleet operations (ManageDrivers)

    pub async fn assign_driver(
        &self,
        actor: &Actor,
        order_id: OrderId,
        driver: DriverRef,
    ) -> Result<Order> {
        self.authorize(actor, Capability::ManageDrivers)?;
        self.assignment.assign_driver(actor, order_id, driver).await
    }

    pub async fn set_driver_areas(
        &self,
        actor: &Actor,
        driver: &DriverRef,
        area_ids: &[AreaId],
    ) -> Result<()> {
        self.authorize(actor, Capability::ManageDrivers)?;
        self.assignment.set_driver_areas(actor, driver, area_ids).await
    }

    pub async fn auto_assign_drivers_by_area(
        &self,
        actor: &Actor,
        delivery_date: NaiveDate,
    ) -> Result<AssignmentReport> {
        self.authorize(actor, Capability::ManageDrivers)?;
        self.assignment
            .auto_assign_drivers_by_area(actor, delivery_date)
            .await
    }
}
