//! # Auto-Assignment Planner
//!
//! Pure planning half of the bulk driver assignment: given the eligible
//! orders and the active driver-area coverage, produce the assignment plan
//! the service then applies in one store transaction. Round-robin counters
//! are scoped to the call, never cached, so concurrent runs on different
//! server instances stay correct.

use crate::models::{AreaId, DriverAreaAssignment, DriverRef, Order, OrderId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One order-to-driver pairing produced by the planner
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAssignment {
    pub order_id: OrderId,
    pub area_id: AreaId,
    pub driver: DriverRef,
}

/// Output of the planning pass, before any write happens
#[derive(Debug, Clone, Default)]
pub struct AssignmentPlan {
    pub planned: Vec<PlannedAssignment>,
    /// Orders in areas with no active driver, keyed by area
    pub skipped_no_driver: BTreeMap<AreaId, Vec<OrderId>>,
    /// Orders carrying no delivery area at all
    pub skipped_no_area: Vec<OrderId>,
}

impl AssignmentPlan {
    pub fn skipped_count(&self) -> usize {
        self.skipped_no_area.len()
            + self
                .skipped_no_driver
                .values()
                .map(Vec::len)
                .sum::<usize>()
    }
}

/// Distribute eligible orders over each area's drivers round-robin.
///
/// Drivers are sorted by id within an area so the distribution is
/// deterministic for a given input; order `i` in an area goes to driver
/// `i mod driver_count`. Areas with no coverage are reported, not assigned.
pub fn plan_assignments(
    orders: &[Order],
    assignments: &[DriverAreaAssignment],
) -> AssignmentPlan {
    let mut drivers_by_area: BTreeMap<&AreaId, Vec<DriverRef>> = BTreeMap::new();
    for assignment in assignments {
        drivers_by_area
            .entry(&assignment.area_id)
            .or_default()
            .push(assignment.driver_ref());
    }
    for drivers in drivers_by_area.values_mut() {
        drivers.sort_by(|a, b| a.id.cmp(&b.id));
    }

    let mut plan = AssignmentPlan::default();
    let mut counters: BTreeMap<&AreaId, usize> = BTreeMap::new();

    for order in orders {
        let Some(area_id) = &order.area_id else {
            plan.skipped_no_area.push(order.id);
            continue;
        };
        let Some(drivers) = drivers_by_area.get(area_id) else {
            plan.skipped_no_driver
                .entry(area_id.clone())
                .or_default()
                .push(order.id);
            continue;
        };
        let counter = counters.entry(area_id).or_insert(0);
        let driver = drivers[*counter % drivers.len()].clone();
        *counter += 1;
        plan.planned.push(PlannedAssignment {
            order_id: order.id,
            area_id: area_id.clone(),
            driver,
        });
    }
    plan
}

/// What one auto-assignment run did, returned to the scheduler and audited
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentReport {
    pub delivery_date: chrono::NaiveDate,
    /// Every order that was eligible when the sweep started
    pub eligible: usize,
    pub assigned: Vec<OrderId>,
    pub skipped_no_driver: BTreeMap<AreaId, Vec<OrderId>>,
    pub skipped_no_area: Vec<OrderId>,
    /// Orders whose eligibility lapsed between planning and the write
    pub conflicts: Vec<OrderId>,
}

impl AssignmentReport {
    /// assigned + skipped + conflicts always covers every eligible order
    pub fn accounted_for(&self) -> usize {
        self.assigned.len()
            + self.skipped_no_area.len()
            + self
                .skipped_no_driver
                .values()
                .map(Vec::len)
                .sum::<usize>()
            + self.conflicts.len()
    }
}
