//! # In-Memory Store
//!
//! Lock-based store used by tests and embedded deployments. One `RwLock`
//! guards all state, so a conditional update and a bulk assignment are each
//! atomic with respect to every other writer, matching the transaction
//! semantics of the Postgres store.

use super::{
    BulkAssignment, BulkAssignmentOutcome, DriverAreaStore, Mutation, OrderStore, StoreError,
    UpdateOutcome, UpdatePredicate,
};
use crate::models::{AreaId, DriverAreaAssignment, DriverId, Order, OrderId};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    /// Keyed by area: the uniqueness invariant is the key
    areas: HashMap<AreaId, DriverAreaAssignment>,
}

/// In-memory implementation of both storage ports
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_update(
        inner: &mut Inner,
        id: OrderId,
        predicate: &UpdatePredicate,
        mutation: Mutation,
    ) -> Result<UpdateOutcome, StoreError> {
        let Some(order) = inner.orders.get_mut(&id) else {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        };
        if !predicate.matches(order) {
            return Ok(UpdateOutcome::NotApplied(order.clone()));
        }
        mutation(order);
        order.version += 1;
        Ok(UpdateOutcome::Applied(order.clone()))
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateId {
                id: order.id.to_string(),
            });
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.read().orders.get(&id).cloned())
    }

    async fn conditional_update(
        &self,
        id: OrderId,
        predicate: UpdatePredicate,
        mutation: Mutation,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut inner = self.inner.write();
        Self::apply_update(&mut inner, id, &predicate, mutation)
    }

    async fn list_unassigned_ready(
        &self,
        delivery_date: NaiveDate,
    ) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|order| {
                order.status == crate::state_machine::OrderStatus::ReadyForDelivery
                    && !order.delivery.is_claimed()
                    && order.delivery_date == Some(delivery_date)
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn assign_drivers_bulk(
        &self,
        assignments: &[BulkAssignment],
    ) -> Result<BulkAssignmentOutcome, StoreError> {
        // One write lock across the whole plan
        let mut inner = self.inner.write();
        let now = Utc::now();
        let mut outcome = BulkAssignmentOutcome::default();
        for assignment in assignments {
            let eligible = inner
                .orders
                .get(&assignment.order_id)
                .is_some_and(|order| assignment.predicate().matches(order));
            if !eligible {
                outcome.conflicts.push(assignment.order_id);
                continue;
            }
            if let Some(order) = inner.orders.get_mut(&assignment.order_id) {
                assignment.apply(order, now);
                order.version += 1;
                outcome.assigned.push(assignment.order_id);
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl DriverAreaStore for InMemoryStore {
    async fn replace_driver_assignment(
        &self,
        driver_id: &DriverId,
        driver_name: &str,
        new_area: Option<AreaId>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();

        // Check before touching anything so a rejection changes nothing
        if let Some(area_id) = &new_area {
            if let Some(existing) = inner.areas.get(area_id) {
                if &existing.driver_id != driver_id {
                    return Err(StoreError::AreaTaken {
                        area_id: area_id.to_string(),
                        driver_id: existing.driver_id.to_string(),
                    });
                }
            }
        }

        inner
            .areas
            .retain(|_, assignment| &assignment.driver_id != driver_id);

        if let Some(area_id) = new_area {
            let assignment =
                DriverAreaAssignment::new(driver_id.clone(), driver_name, area_id.clone());
            inner.areas.insert(area_id, assignment);
        }
        Ok(())
    }

    async fn assignment_for_driver(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<DriverAreaAssignment>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .areas
            .values()
            .find(|assignment| &assignment.driver_id == driver_id)
            .cloned())
    }

    async fn assignments_for_area(
        &self,
        area_id: &AreaId,
    ) -> Result<Vec<DriverAreaAssignment>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.areas.get(area_id).cloned().into_iter().collect())
    }

    async fn active_assignments(&self) -> Result<Vec<DriverAreaAssignment>, StoreError> {
        let inner = self.inner.read();
        let mut rows: Vec<DriverAreaAssignment> = inner.areas.values().cloned().collect();
        rows.sort_by(|a, b| a.area_id.cmp(&b.area_id));
        Ok(rows)
    }
}
