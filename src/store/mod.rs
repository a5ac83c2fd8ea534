//! # Order Storage
//!
//! Storage ports for the fulfillment core. All status changes go through
//! [`OrderStore::conditional_update`], the compare-and-swap primitive that
//! keeps concurrent writers from clobbering each other: the store re-checks
//! the predicate against the current row inside its own transaction (or lock)
//! and either applies the mutation or returns the current snapshot untouched.
//! Callers classify a `NotApplied` snapshot themselves; the store never
//! decides what a lost race means.
//!
//! The store owns `version`: it increments it on every applied write, so
//! mutations must never touch it.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use crate::models::{ActorRef, AreaId, DriverAreaAssignment, DriverId, DriverRef, Order, OrderId};
use crate::state_machine::OrderStatus;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Errors raised by the storage layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("duplicate order id: {id}")]
    DuplicateId { id: String },

    #[error("area {area_id} is already covered by driver {driver_id}")]
    AreaTaken { area_id: String, driver_id: String },

    #[error("transaction serialization failure: {reason}")]
    SerializationFailure { reason: String },

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    /// Whether the same call can succeed if simply replayed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SerializationFailure { .. } | Self::Unavailable { .. }
        )
    }
}

/// Conditions a conditional update re-checks against the current row.
///
/// Every populated field must hold for the mutation to apply. An empty
/// predicate always applies.
#[derive(Debug, Clone, Default)]
pub struct UpdatePredicate {
    /// Current status must be one of these
    pub status_in: Option<Vec<OrderStatus>>,
    /// Current version must equal this exactly
    pub version_is: Option<i64>,
    /// Delivery must be unclaimed, or already claimed by this driver
    pub driver_unclaimed_or: Option<DriverId>,
}

impl UpdatePredicate {
    /// Require the order to sit in exactly one status
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status_in: Some(vec![status]),
            ..Default::default()
        }
    }

    /// Require the order to sit in one of the given statuses
    pub fn status_in(statuses: &[OrderStatus]) -> Self {
        Self {
            status_in: Some(statuses.to_vec()),
            ..Default::default()
        }
    }

    /// Require the current version to match exactly
    pub fn version(version: i64) -> Self {
        Self {
            version_is: Some(version),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version_is = Some(version);
        self
    }

    pub fn with_driver_unclaimed_or(mut self, driver_id: DriverId) -> Self {
        self.driver_unclaimed_or = Some(driver_id);
        self
    }

    /// Evaluate against the current row
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(statuses) = &self.status_in {
            if !statuses.contains(&order.status) {
                return false;
            }
        }
        if let Some(version) = self.version_is {
            if order.version != version {
                return false;
            }
        }
        if let Some(driver_id) = &self.driver_unclaimed_or {
            match &order.delivery.driver_id {
                Some(current) if current != driver_id => return false,
                _ => {}
            }
        }
        true
    }
}

/// In-place change applied to the row when the predicate holds.
///
/// Runs exactly once, inside the store's transaction or lock. Must not
/// touch `version`.
pub type Mutation = Box<dyn FnOnce(&mut Order) + Send>;

/// Result of a conditional update
#[derive(Debug)]
pub enum UpdateOutcome {
    /// Predicate held; mutation applied; the updated row
    Applied(Order),
    /// Predicate failed; the current row, untouched
    NotApplied(Order),
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// One planned driver assignment within a bulk auto-assignment run
#[derive(Debug, Clone)]
pub struct BulkAssignment {
    pub order_id: OrderId,
    pub driver: DriverRef,
    pub assigned_by: ActorRef,
    pub note: String,
}

impl BulkAssignment {
    /// Eligibility re-checked under the store's write lock: still waiting
    /// for a driver, and unclaimed (or already ours)
    pub(crate) fn predicate(&self) -> UpdatePredicate {
        UpdatePredicate::status(OrderStatus::ReadyForDelivery)
            .with_driver_unclaimed_or(self.driver.id.clone())
    }

    pub(crate) fn apply(&self, order: &mut Order, now: DateTime<Utc>) {
        order.delivery.assign(&self.driver, now);
        order.append_history_note(&self.assigned_by, self.note.clone(), now);
    }
}

/// What a bulk assignment run applied and what it could not
#[derive(Debug, Clone, Default)]
pub struct BulkAssignmentOutcome {
    pub assigned: Vec<OrderId>,
    /// Orders whose eligibility no longer held at write time
    pub conflicts: Vec<OrderId>,
}

/// Order persistence port
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order; fails on duplicate id
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    /// Fetch by id
    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Atomically re-check the predicate and apply the mutation.
    ///
    /// On `Applied` the returned row carries the bumped version. On
    /// `NotApplied` the row is returned exactly as the store sees it, so
    /// the caller can classify the lost race without a second
    /// read-modify-write window.
    async fn conditional_update(
        &self,
        id: OrderId,
        predicate: UpdatePredicate,
        mutation: Mutation,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Orders awaiting a driver for the given delivery date, for the
    /// auto-assignment sweep: `ready_for_delivery` and unclaimed.
    async fn list_unassigned_ready(
        &self,
        delivery_date: NaiveDate,
    ) -> Result<Vec<Order>, StoreError>;

    /// Apply a whole assignment plan as one atomic unit.
    ///
    /// Eligibility is re-verified per order under the write lock; orders
    /// that lost theirs are reported as conflicts rather than aborting
    /// the batch. A storage failure aborts and applies nothing.
    async fn assign_drivers_bulk(
        &self,
        assignments: &[BulkAssignment],
    ) -> Result<BulkAssignmentOutcome, StoreError>;
}

/// Driver coverage persistence port.
///
/// Uniqueness invariant: an area is covered by at most one driver and a
/// driver covers at most one area. The replace operation enforces it
/// atomically, even against concurrent replaces for other drivers.
#[async_trait]
pub trait DriverAreaStore: Send + Sync {
    /// Replace a driver's coverage with the given area, or clear it.
    ///
    /// Fails with [`StoreError::AreaTaken`] if the area is already covered
    /// by a different driver; on failure nothing changes.
    async fn replace_driver_assignment(
        &self,
        driver_id: &DriverId,
        driver_name: &str,
        new_area: Option<AreaId>,
    ) -> Result<(), StoreError>;

    /// The driver's active assignment, if any
    async fn assignment_for_driver(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<DriverAreaAssignment>, StoreError>;

    /// Active assignments covering an area (at most one under the invariant)
    async fn assignments_for_area(
        &self,
        area_id: &AreaId,
    ) -> Result<Vec<DriverAreaAssignment>, StoreError>;

    /// Every active assignment, for the auto-assignment sweep
    async fn active_assignments(&self) -> Result<Vec<DriverAreaAssignment>, StoreError>;
}
