#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Fulfillment Core
//!
//! Order fulfillment state machine for a food-distribution ERP: the guarded
//! status transitions an order passes through (approval → confirmation →
//! packing → delivery → completion or cancellation), the optimistic
//! concurrency protocol that keeps concurrent driver and admin actions safe,
//! the idempotency contracts that tolerate retried mobile-network calls, and
//! the round-robin driver-to-area assignment algorithm.
//!
//! ## Architecture
//!
//! Everything mutating flows through one primitive: the storage port's
//! conditional update, a compare-and-swap that applies a mutation only if a
//! predicate (status set, version, driver claim) still holds against the
//! record at write time. The status change and its history entry land in the
//! same atomic write. When a conditional update does not apply, the caller
//! re-classifies the returned snapshot — idempotent no-op, conflict, or
//! invalid state — so a transient race never surfaces as a hard error when
//! the intent was already satisfied.
//!
//! ## Module Organization
//!
//! - [`models`] - Order aggregate, embedded delivery record, driver/area rows
//! - [`state_machine`] - Pure status model, transition guard, lifecycle events
//! - [`store`] - Storage ports plus the in-memory and Postgres backends
//! - [`fulfillment`] - OrderLifecycle, DeliveryAssignment, the wiring facade
//! - [`events`] - Broadcast publisher, audit and notification sinks
//! - [`permissions`] - Capability check port consulted at the facade
//! - [`config`] - Configuration with file/env loading
//! - [`error`] - Structured error taxonomy with retryability
//!
//! ## Quick Start
//!
//! ```rust
//! use fulfillment_core::config::FulfillmentConfig;
//! use fulfillment_core::fulfillment::system::{FulfillmentSystem, NewOrder};
//! use fulfillment_core::models::{Actor, ActorRole, OrderItem};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let system = FulfillmentSystem::in_memory(FulfillmentConfig::default());
//! let admin = Actor::new("user_admin", "Dana Ropata", None, ActorRole::Admin);
//!
//! let order = system
//!     .create_order(
//!         &admin,
//!         NewOrder {
//!             order_number: "ORD-1001".to_string(),
//!             customer_name: "Harbour Cafe".to_string(),
//!             items: vec![OrderItem::new("sku-flour", "Flour 10kg", 10, 2_500)],
//!             area_id: None,
//!             delivery_date: None,
//!         },
//!     )
//!     .await?;
//!
//! let confirmed = system.confirm_order(&admin, order.id, None).await?;
//! println!("order {} is {}", confirmed.order_number, confirmed.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Collaborator Boundaries
//!
//! Packing timestamps, route sequencing, identity resolution, and capability
//! grants are owned by external systems; this crate reads what it needs from
//! the order document and delegates authorization to the injected
//! [`permissions::PermissionCheck`]. Audit and notification delivery are
//! fire-and-forget: a committed transition is never failed by a sink.

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod fulfillment;
pub mod logging;
pub mod models;
pub mod permissions;
pub mod state_machine;
pub mod store;
pub mod validation;

pub use config::FulfillmentConfig;
pub use constants::{status_groups, system};
pub use error::{FulfillmentError, Result};
pub use fulfillment::{
    AssignmentReport, BackorderApproval, CancelOptions, DeliveryAssignment, FulfillmentSystem,
    MarkDeliveredOptions, NewOrder, OrderLifecycle,
};
pub use models::{
    Actor, ActorRef, ActorRole, AreaId, DriverAreaAssignment, DriverId, DriverRef, Order, OrderId,
    OrderItem, ProofKind,
};
pub use state_machine::{
    check_transition, BackorderDecision, NotificationEvent, OrderStatus, TransitionCheck,
    TransitionContext,
};
pub use store::{
    DriverAreaStore, InMemoryStore, OrderStore, PgStore, StoreError, UpdateOutcome,
    UpdatePredicate,
};
