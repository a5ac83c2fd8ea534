//! Shared test fixtures: actors, an order builder, and an assembled
//! in-memory system that keeps a handle on the store so tests can seed
//! orders in any lifecycle state.

#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use fulfillment_core::config::FulfillmentConfig;
use fulfillment_core::models::{
    Actor, ActorRole, AreaId, DriverRef, Order, OrderItem, ProductId, ProofKind, ProofOfDelivery,
    ShortfallItem, StockShortfall,
};
use fulfillment_core::permissions::StaticRolePermissions;
use fulfillment_core::store::{InMemoryStore, OrderStore};
use fulfillment_core::{FulfillmentSystem, OrderStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An assembled system plus direct access to the backing store
pub struct TestSystem {
    pub system: FulfillmentSystem,
    pub store: Arc<InMemoryStore>,
}

pub fn test_system() -> TestSystem {
    let store = Arc::new(InMemoryStore::new());
    let system = FulfillmentSystem::with_stores(
        FulfillmentConfig::default(),
        store.clone(),
        store.clone(),
        Arc::new(StaticRolePermissions),
    );
    TestSystem { system, store }
}

static ORDER_SEQ: AtomicU64 = AtomicU64::new(1000);

pub fn unique_order_number() -> String {
    format!("ORD-{}", ORDER_SEQ.fetch_add(1, Ordering::Relaxed))
}

pub fn admin() -> Actor {
    Actor::new("user_admin", "Dana Ropata", None, ActorRole::Admin)
}

pub fn sales() -> Actor {
    Actor::new("user_sales", "Pete Aldridge", None, ActorRole::Sales)
}

pub fn driver(id: &str, name: &str) -> Actor {
    Actor::new(id, name, None, ActorRole::Driver)
}

pub fn driver_ref(actor: &Actor) -> DriverRef {
    DriverRef::new(actor.driver_id(), Some(actor.display_name.clone()))
}

/// Builder for seeding orders directly into the store in any state
pub struct OrderBuilder {
    status: OrderStatus,
    customer_name: String,
    items: Vec<OrderItem>,
    area_id: Option<AreaId>,
    delivery_date: Option<NaiveDate>,
    packed_today: bool,
    claimed_by: Option<DriverRef>,
    started: bool,
    proof_url: Option<String>,
    shortfall: Vec<ShortfallItem>,
}

impl OrderBuilder {
    pub fn new() -> Self {
        Self {
            status: OrderStatus::AwaitingApproval,
            customer_name: "Harbour Cafe".to_string(),
            items: Vec::new(),
            area_id: None,
            delivery_date: None,
            packed_today: false,
            claimed_by: None,
            started: false,
            proof_url: None,
            shortfall: Vec::new(),
        }
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn customer(mut self, name: &str) -> Self {
        self.customer_name = name.to_string();
        self
    }

    pub fn item(mut self, product_id: &str, name: &str, quantity: u32, unit_price_cents: i64) -> Self {
        self.items
            .push(OrderItem::new(product_id, name, quantity, unit_price_cents));
        self
    }

    pub fn area(mut self, area_id: &str) -> Self {
        self.area_id = Some(AreaId::new(area_id));
        self
    }

    pub fn delivery_date(mut self, date: NaiveDate) -> Self {
        self.delivery_date = Some(date);
        self
    }

    pub fn packed_today(mut self) -> Self {
        self.packed_today = true;
        self
    }

    pub fn claimed_by(mut self, driver: &Actor) -> Self {
        self.claimed_by = Some(driver_ref(driver));
        self
    }

    pub fn started(mut self) -> Self {
        self.started = true;
        self
    }

    pub fn with_proof(mut self, file_url: &str) -> Self {
        self.proof_url = Some(file_url.to_string());
        self
    }

    pub fn short(mut self, product_id: &str, requested: u32, available: u32) -> Self {
        self.shortfall.push(ShortfallItem {
            product_id: ProductId::new(product_id),
            requested,
            available,
        });
        self
    }

    pub fn build(self) -> Order {
        let items = if self.items.is_empty() {
            vec![OrderItem::new("sku-flour", "Flour 10kg", 10, 2_500)]
        } else {
            self.items
        };
        let mut order = Order::new(
            unique_order_number(),
            self.customer_name,
            items,
            0.15,
            &admin().as_ref(),
        );
        order.status = self.status;
        order.area_id = self.area_id;
        order.delivery_date = self.delivery_date;
        if self.packed_today {
            order.packing.packed_at = Some(Utc::now());
        }
        if let Some(driver) = &self.claimed_by {
            order.delivery.assign(driver, Utc::now());
        }
        if self.started {
            order.delivery.started_at = Some(Utc::now());
        }
        if let Some(url) = self.proof_url {
            order.delivery.proof_of_delivery = Some(ProofOfDelivery {
                kind: ProofKind::Photo,
                file_url: url,
                uploaded_at: Utc::now(),
            });
        }
        if !self.shortfall.is_empty() {
            order.report_shortfall(StockShortfall::new(self.shortfall));
        }
        order
    }

    pub async fn seed(self, store: &InMemoryStore) -> Order {
        let order = self.build();
        store
            .insert(&order)
            .await
            .expect("failed to seed test order");
        order
    }
}

impl Default for OrderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
