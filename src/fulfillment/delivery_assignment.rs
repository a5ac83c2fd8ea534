//! # Delivery Assignment
//!
//! Driver claim and relinquish operations plus area coverage management.
//! Self-claims (`start_delivery`) are status-guarded with the driver gate in
//! the predicate, so two drivers racing for the same ready order can never
//! both win; driver reassignment by an admin is version-guarded instead,
//! because driver identity is not part of the state machine. The history
//! note for a reassignment rides inside the same conditional update as the
//! field change, never as a trailing second write.

use crate::config::FulfillmentConfig;
use crate::constants::{audit, status_groups};
use crate::error::{
    conflict, forbidden, invalid_state, order_not_found, validation, FulfillmentError, Result,
};
use crate::events::{AuditRecord, AuditSink, NotificationSink};
use crate::fulfillment::auto_assign::{plan_assignments, AssignmentReport};
use crate::fulfillment::{emit_audit, emit_notification};
use crate::models::{
    Actor, AreaId, DriverId, DriverRef, Order, OrderId, ProofKind, ProofOfDelivery,
};
use crate::state_machine::{DriverChange, NotificationEvent, OrderStatus};
use crate::store::{
    BulkAssignment, DriverAreaStore, OrderStore, StoreError, UpdateOutcome, UpdatePredicate,
};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Service owning driver claims, proof uploads, and area coverage
pub struct DeliveryAssignment {
    store: Arc<dyn OrderStore>,
    areas: Arc<dyn DriverAreaStore>,
    audit: Arc<dyn AuditSink>,
    notifications: Arc<dyn NotificationSink>,
    config: FulfillmentConfig,
}

impl DeliveryAssignment {
    pub fn new(
        store: Arc<dyn OrderStore>,
        areas: Arc<dyn DriverAreaStore>,
        audit: Arc<dyn AuditSink>,
        notifications: Arc<dyn NotificationSink>,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            store,
            areas,
            audit,
            notifications,
            config,
        }
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))
    }

    /// Admin assignment or reassignment of a driver.
    ///
    /// Version-guarded: two admins reassigning concurrently cannot lose an
    /// update silently; the loser re-reads and either finds its driver
    /// already installed (success) or surfaces a conflict. The audit record
    /// carries the displaced driver for traceability.
    #[instrument(skip(self, actor, driver), fields(order_id = %order_id, actor = %actor.id, driver_id = %driver.id))]
    pub async fn assign_driver(
        &self,
        actor: &Actor,
        order_id: OrderId,
        driver: DriverRef,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !order.status.can_hold_driver() {
            return Err(invalid_state(
                order.status,
                "drivers can only be assigned while the order is ready or out for delivery",
            ));
        }

        let previous_driver_id = order.delivery.driver_id.clone();
        let actor_ref = actor.as_ref();
        let driver_for_mutation = driver.clone();
        let note = format!(
            "Driver {} assigned",
            driver.name.as_deref().unwrap_or_else(|| driver.id.as_str())
        );
        let predicate = UpdatePredicate::status_in(status_groups::DRIVER_ASSIGNABLE_STATUSES)
            .with_version(order.version);
        let outcome = self
            .store
            .conditional_update(
                order_id,
                predicate,
                Box::new(move |order| {
                    let now = Utc::now();
                    order.delivery.assign(&driver_for_mutation, now);
                    order.append_history_note(&actor_ref, note, now);
                }),
            )
            .await?;

        let updated = match outcome {
            UpdateOutcome::Applied(order) => order,
            UpdateOutcome::NotApplied(snapshot) => {
                // A concurrent writer got there first; installing the same
                // driver satisfies the intent
                if snapshot.status.can_hold_driver() && snapshot.delivery.is_claimed_by(&driver.id)
                {
                    return Ok(snapshot);
                }
                return if snapshot.status.can_hold_driver() {
                    Err(conflict(
                        "order was modified by another actor; refresh and retry the assignment",
                    ))
                } else {
                    Err(invalid_state(
                        snapshot.status,
                        "drivers can only be assigned while the order is ready or out for delivery",
                    ))
                };
            }
        };

        info!(
            order_id = %order_id,
            driver_id = %driver.id,
            previous = ?previous_driver_id,
            "Driver assigned"
        );
        let change = DriverChange {
            order_id,
            driver_id: driver.id.clone(),
            previous_driver_id,
            area_id: updated.area_id.clone(),
        };
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::DRIVER_ASSIGNED,
                actor.as_ref(),
                serde_json::to_value(&change).unwrap_or_else(|_| json!({})),
            )
            .for_order(order_id),
        )
        .await;
        Ok(updated)
    }

    /// Driver self-claim: flip a ready order to out-for-delivery.
    ///
    /// Idempotent for the driver who already started; a different driver
    /// gets a conflict after the flip, or forbidden while the order is still
    /// ready but claimed.
    #[instrument(skip(self, actor), fields(order_id = %order_id, driver_id = %actor.id))]
    pub async fn start_delivery(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let driver_id = actor.driver_id();
        let order = self.load(order_id).await?;
        if let Some(resolved) = Self::classify_start_state(&order, &driver_id)? {
            return Ok(resolved);
        }

        let actor_ref = actor.as_ref();
        let driver = DriverRef::new(driver_id.clone(), Some(actor.display_name.clone()));
        let predicate = UpdatePredicate::status(OrderStatus::ReadyForDelivery)
            .with_driver_unclaimed_or(driver_id.clone());
        let outcome = self
            .store
            .conditional_update(
                order_id,
                predicate,
                Box::new(move |order| {
                    let now = Utc::now();
                    if !order.delivery.is_claimed() {
                        order.delivery.assign(&driver, now);
                    }
                    order.delivery.started_at = Some(now);
                    order.transition_to(
                        OrderStatus::OutForDelivery,
                        &actor_ref,
                        Some("Delivery started".to_string()),
                        now,
                    );
                }),
            )
            .await?;

        let updated = match outcome {
            UpdateOutcome::Applied(order) => order,
            UpdateOutcome::NotApplied(snapshot) => {
                return match Self::classify_start_state(&snapshot, &driver_id)? {
                    Some(resolved) => Ok(resolved),
                    // Predicate failed but the pre-checks pass: the claim
                    // changed hands mid-flight
                    None => Err(conflict(
                        "order was claimed by another driver; refresh and retry",
                    )),
                };
            }
        };

        info!(order_id = %order_id, driver_id = %driver_id, "Delivery started");
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::DELIVERY_STARTED,
                actor.as_ref(),
                json!({ "driver_id": driver_id }),
            )
            .for_order(order_id),
        )
        .await;
        emit_notification(
            &self.notifications,
            &NotificationEvent::OutForDelivery {
                order_id,
                order_number: updated.order_number.clone(),
                customer_name: updated.customer_name.clone(),
                driver_id,
                driver_name: updated.delivery.driver_name.clone(),
            },
        )
        .await;
        Ok(updated)
    }

    /// Shared pre-check/classification for `start_delivery`.
    ///
    /// `Ok(Some(order))` means the call is an idempotent no-op; `Ok(None)`
    /// means the claim attempt should proceed.
    fn classify_start_state(order: &Order, driver_id: &DriverId) -> Result<Option<Order>> {
        match order.status {
            OrderStatus::OutForDelivery if order.delivery.is_claimed_by(driver_id) => {
                Ok(Some(order.clone()))
            }
            OrderStatus::OutForDelivery => Err(conflict(
                "another driver has already started this delivery",
            )),
            OrderStatus::ReadyForDelivery
                if order.delivery.is_claimed() && !order.delivery.is_claimed_by(driver_id) =>
            {
                Err(forbidden("order is assigned to another driver"))
            }
            OrderStatus::ReadyForDelivery => Ok(None),
            status => Err(invalid_state(
                status,
                format!("no transition from {status} to out_for_delivery"),
            )),
        }
    }

    /// Attach a proof-of-delivery artifact to an out-for-delivery order.
    ///
    /// Not a status transition; a guarded plain write. Re-uploading the
    /// identical proof is a no-op, a different proof overwrites (the driver
    /// correcting a bad photo).
    #[instrument(skip(self, actor, file_url), fields(order_id = %order_id, driver_id = %actor.id))]
    pub async fn upload_proof_of_delivery(
        &self,
        actor: &Actor,
        order_id: OrderId,
        kind: ProofKind,
        file_url: &str,
    ) -> Result<()> {
        crate::validation::validate_proof_url(file_url)?;
        let driver_id = actor.driver_id();
        let order = self.load(order_id).await?;
        Self::ensure_out_and_owned(&order, &driver_id)?;
        if Self::has_identical_proof(&order, kind, file_url) {
            return Ok(());
        }

        let proof = ProofOfDelivery {
            kind,
            file_url: file_url.trim().to_string(),
            uploaded_at: Utc::now(),
        };
        let predicate = UpdatePredicate::status(OrderStatus::OutForDelivery)
            .with_driver_unclaimed_or(driver_id.clone());
        let outcome = self
            .store
            .conditional_update(
                order_id,
                predicate,
                Box::new(move |order| {
                    order.delivery.proof_of_delivery = Some(proof);
                    order.updated_at = Utc::now();
                }),
            )
            .await?;

        match outcome {
            UpdateOutcome::Applied(_) => {}
            UpdateOutcome::NotApplied(snapshot) => {
                if Self::has_identical_proof(&snapshot, kind, file_url) {
                    return Ok(());
                }
                Self::ensure_out_and_owned(&snapshot, &driver_id)?;
                return Err(conflict(
                    "order changed while uploading proof; refresh and retry",
                ));
            }
        }

        info!(order_id = %order_id, kind = %kind, "Proof of delivery uploaded");
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::PROOF_UPLOADED,
                actor.as_ref(),
                json!({ "kind": kind, "file_url": file_url }),
            )
            .for_order(order_id),
        )
        .await;
        Ok(())
    }

    /// Driver completion of an out-for-delivery order.
    ///
    /// Proof of delivery is a hard precondition checked before anything
    /// else; its absence is a validation error regardless of status.
    /// Idempotent on already-delivered orders.
    #[instrument(skip(self, actor, notes), fields(order_id = %order_id, driver_id = %actor.id))]
    pub async fn complete_delivery(
        &self,
        actor: &Actor,
        order_id: OrderId,
        notes: Option<String>,
    ) -> Result<Order> {
        let driver_id = actor.driver_id();
        let order = self.load(order_id).await?;
        if order.delivery.proof_of_delivery.is_none() {
            return Err(validation(
                "proof of delivery must be uploaded before completing the delivery",
            ));
        }
        if order.status == OrderStatus::Delivered {
            return Ok(order);
        }
        Self::ensure_out_and_owned(&order, &driver_id)?;

        let actor_ref = actor.as_ref();
        let predicate = UpdatePredicate::status(OrderStatus::OutForDelivery)
            .with_driver_unclaimed_or(driver_id.clone());
        let outcome = self
            .store
            .conditional_update(
                order_id,
                predicate,
                Box::new(move |order| {
                    let now = Utc::now();
                    if order.delivery.delivered_at.is_none() {
                        order.delivery.delivered_at = Some(now);
                    }
                    order.transition_to(
                        OrderStatus::Delivered,
                        &actor_ref,
                        notes.or_else(|| Some("Delivered".to_string())),
                        now,
                    );
                }),
            )
            .await?;

        let updated = match outcome {
            UpdateOutcome::Applied(order) => order,
            UpdateOutcome::NotApplied(snapshot) => {
                if snapshot.status == OrderStatus::Delivered {
                    return Ok(snapshot);
                }
                Self::ensure_out_and_owned(&snapshot, &driver_id)?;
                return Err(conflict(
                    "order changed while completing the delivery; refresh and retry",
                ));
            }
        };

        info!(order_id = %order_id, driver_id = %driver_id, "Delivery completed");
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::STATUS_CHANGED,
                actor.as_ref(),
                json!({ "from": OrderStatus::OutForDelivery, "to": OrderStatus::Delivered }),
            )
            .for_order(order_id),
        )
        .await;
        if let Some(delivered_at) = updated.delivery.delivered_at {
            emit_notification(
                &self.notifications,
                &NotificationEvent::Delivered {
                    order_id,
                    order_number: updated.order_number.clone(),
                    customer_name: updated.customer_name.clone(),
                    delivered_at,
                },
            )
            .await;
        }
        Ok(updated)
    }

    /// Driver returns an undeliverable order to the warehouse.
    ///
    /// Flips back to ready-for-delivery, clears `started_at` as the
    /// re-attempt signal, and records the return metadata in the same write.
    /// The stale claim is retained pending reassignment. Idempotent for the
    /// driver who already returned it.
    #[instrument(skip(self, actor, reason, notes), fields(order_id = %order_id, driver_id = %actor.id))]
    pub async fn return_to_warehouse(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: &str,
        notes: Option<String>,
    ) -> Result<Order> {
        crate::validation::validate_return_reason(reason)?;
        let driver_id = actor.driver_id();
        let order = self.load(order_id).await?;
        if Self::already_returned_by(&order, &driver_id) {
            return Ok(order);
        }
        Self::ensure_out_and_owned(&order, &driver_id)?;

        let actor_ref = actor.as_ref();
        let reason_owned = reason.trim().to_string();
        let return_notes = notes;
        let predicate = UpdatePredicate::status(OrderStatus::OutForDelivery)
            .with_driver_unclaimed_or(driver_id.clone());
        let outcome = self
            .store
            .conditional_update(
                order_id,
                predicate,
                Box::new(move |order| {
                    let now = Utc::now();
                    let note = format!("Returned to warehouse: {reason_owned}");
                    order.delivery.started_at = None;
                    order.delivery.return_reason = Some(reason_owned);
                    order.delivery.return_notes = return_notes;
                    order.delivery.returned_at = Some(now);
                    order.transition_to(
                        OrderStatus::ReadyForDelivery,
                        &actor_ref,
                        Some(note),
                        now,
                    );
                }),
            )
            .await?;

        let updated = match outcome {
            UpdateOutcome::Applied(order) => order,
            UpdateOutcome::NotApplied(snapshot) => {
                if Self::already_returned_by(&snapshot, &driver_id) {
                    return Ok(snapshot);
                }
                Self::ensure_out_and_owned(&snapshot, &driver_id)?;
                return Err(conflict(
                    "order changed while returning to the warehouse; refresh and retry",
                ));
            }
        };

        info!(order_id = %order_id, driver_id = %driver_id, reason = reason, "Returned to warehouse");
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::STATUS_CHANGED,
                actor.as_ref(),
                json!({
                    "from": OrderStatus::OutForDelivery,
                    "to": OrderStatus::ReadyForDelivery,
                    "return_reason": reason,
                }),
            )
            .for_order(order_id),
        )
        .await;
        emit_notification(
            &self.notifications,
            &NotificationEvent::ReturnedToWarehouse {
                order_id,
                order_number: updated.order_number.clone(),
                driver_id,
                reason: reason.trim().to_string(),
            },
        )
        .await;
        Ok(updated)
    }

    /// Replace a driver's area coverage (or clear it with an empty set).
    ///
    /// The store enforces the one-driver-one-area pairing atomically; a
    /// taken area or a serialization loss both surface as conflicts.
    #[instrument(skip(self, actor, driver), fields(actor = %actor.id, driver_id = %driver.id))]
    pub async fn set_driver_areas(
        &self,
        actor: &Actor,
        driver: &DriverRef,
        area_ids: &[AreaId],
    ) -> Result<()> {
        crate::validation::validate_area_set(area_ids)?;
        let new_area = area_ids.first().cloned();
        let driver_name = driver
            .name
            .clone()
            .unwrap_or_else(|| driver.id.to_string());

        match self
            .areas
            .replace_driver_assignment(&driver.id, &driver_name, new_area.clone())
            .await
        {
            Ok(()) => {}
            Err(StoreError::AreaTaken { area_id, driver_id }) => {
                return Err(conflict(format!(
                    "area {area_id} is already covered by driver {driver_id}"
                )));
            }
            Err(err @ StoreError::SerializationFailure { .. }) => {
                return Err(conflict(format!("concurrent area reassignment: {err}")));
            }
            Err(err) => return Err(err.into()),
        }

        info!(driver_id = %driver.id, area = ?new_area, "Driver area coverage replaced");
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::DRIVER_AREAS_REPLACED,
                actor.as_ref(),
                json!({ "driver_id": driver.id, "area_id": new_area }),
            ),
        )
        .await;
        Ok(())
    }

    /// Bulk round-robin assignment of unclaimed ready orders for a date.
    ///
    /// Planning is pure; the whole plan is applied in one store transaction
    /// under a generous timeout because it can touch hundreds of orders.
    /// Orders whose eligibility lapsed by write time are reported as
    /// conflicts, never half-applied.
    #[instrument(skip(self, actor), fields(actor = %actor.id, delivery_date = %delivery_date))]
    pub async fn auto_assign_drivers_by_area(
        &self,
        actor: &Actor,
        delivery_date: NaiveDate,
    ) -> Result<AssignmentReport> {
        let budget = self.config.assignment.auto_assign_timeout();
        match tokio::time::timeout(budget, self.run_auto_assign(actor, delivery_date)).await {
            Ok(result) => result,
            Err(_) => Err(FulfillmentError::Internal(format!(
                "auto-assignment run for {delivery_date} exceeded {}s",
                budget.as_secs()
            ))),
        }
    }

    async fn run_auto_assign(
        &self,
        actor: &Actor,
        delivery_date: NaiveDate,
    ) -> Result<AssignmentReport> {
        let orders = self.store.list_unassigned_ready(delivery_date).await?;
        let eligible = orders.len();
        let coverage = self.areas.active_assignments().await?;
        let plan = plan_assignments(&orders, &coverage);

        let assigned_by = actor.as_ref();
        let bulk: Vec<BulkAssignment> = plan
            .planned
            .iter()
            .map(|planned| BulkAssignment {
                order_id: planned.order_id,
                driver: planned.driver.clone(),
                assigned_by: assigned_by.clone(),
                note: format!(
                    "Driver {} auto-assigned for {delivery_date}",
                    planned
                        .driver
                        .name
                        .as_deref()
                        .unwrap_or_else(|| planned.driver.id.as_str())
                ),
            })
            .collect();
        let outcome = self.store.assign_drivers_bulk(&bulk).await?;

        let report = AssignmentReport {
            delivery_date,
            eligible,
            assigned: outcome.assigned,
            skipped_no_driver: plan.skipped_no_driver,
            skipped_no_area: plan.skipped_no_area,
            conflicts: outcome.conflicts,
        };
        info!(
            delivery_date = %delivery_date,
            eligible = report.eligible,
            assigned = report.assigned.len(),
            conflicts = report.conflicts.len(),
            skipped_no_area = report.skipped_no_area.len(),
            "Auto-assignment run finished"
        );
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::AUTO_ASSIGN_COMPLETED,
                actor.as_ref(),
                serde_json::to_value(&report).unwrap_or_else(|_| json!({})),
            ),
        )
        .await;
        Ok(report)
    }

    fn ensure_out_and_owned(order: &Order, driver_id: &DriverId) -> Result<()> {
        if order.status != OrderStatus::OutForDelivery {
            return Err(invalid_state(
                order.status,
                "order is not out for delivery",
            ));
        }
        if !order.delivery.is_claimed_by(driver_id) {
            return Err(forbidden(
                "only the assigned driver can act on this delivery",
            ));
        }
        Ok(())
    }

    fn has_identical_proof(order: &Order, kind: ProofKind, file_url: &str) -> bool {
        order
            .delivery
            .proof_of_delivery
            .as_ref()
            .is_some_and(|proof| proof.kind == kind && proof.file_url == file_url.trim())
    }

    fn already_returned_by(order: &Order, driver_id: &DriverId) -> bool {
        order.status == OrderStatus::ReadyForDelivery
            && order.delivery.is_claimed_by(driver_id)
            && order.delivery.return_reason.is_some()
            && order.delivery.started_at.is_none()
    }
}
