//! # Order Lifecycle
//!
//! Order-level guarded transitions: confirmation, cancellation, the admin
//! mark-delivered path, and the backorder decision sub-flow. Every mutation
//! goes through the store's conditional update so the status change and its
//! history entry land in one atomic write; when the update does not apply,
//! the returned snapshot is classified into idempotent success, conflict, or
//! invalid-state rather than surfacing a blind failure.

use crate::config::FulfillmentConfig;
use crate::constants::{audit, status_groups};
use crate::error::{conflict, invalid_state, order_not_found, validation, Result};
use crate::events::{AuditRecord, AuditSink, NotificationSink};
use crate::fulfillment::{emit_audit, emit_notification};
use crate::models::{Actor, BackorderResolution, Order, OrderId, ProductId};
use crate::state_machine::{
    check_transition, BackorderDecision, NotificationEvent, OrderStatus, TransitionCheck,
    TransitionContext,
};
use crate::store::{OrderStore, UpdateOutcome, UpdatePredicate};
use crate::validation::{
    validate_approved_quantities, validate_cancellation_reason, validate_rejection_reason,
    ApprovalExtent,
};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Options for [`OrderLifecycle::cancel_order`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelOptions {
    /// Explicit operator confirmation to cancel an already-delivered order
    pub force_delivered: bool,
}

/// Options for [`OrderLifecycle::mark_delivered`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkDeliveredOptions {
    /// Skip the same-day-packed business rule
    pub admin_override: bool,
}

/// Operator input for [`OrderLifecycle::approve_backorder`].
///
/// Lines not mentioned in `approved_quantities` keep their requested
/// quantity; a `None` map approves the whole order as requested.
#[derive(Debug, Clone, Default)]
pub struct BackorderApproval {
    pub approved_quantities: Option<BTreeMap<ProductId, u32>>,
    pub estimated_fulfillment: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Allow quantities above the reported availability
    pub bypass_stock_check: bool,
}

/// Service owning the order-level status transitions
pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditSink>,
    notifications: Arc<dyn NotificationSink>,
    config: FulfillmentConfig,
}

impl OrderLifecycle {
    pub fn new(
        store: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditSink>,
        notifications: Arc<dyn NotificationSink>,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            store,
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

    /// Confirm an awaiting-approval order.
    ///
    /// Not idempotent: confirming an already-confirmed order is an
    /// invalid-state error. A resolved backorder no longer blocks
    /// confirmation; the resolution record is cleared on success.
    #[instrument(skip(self, actor, notes), fields(order_id = %order_id, actor = %actor.id))]
    pub async fn confirm_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        notes: Option<String>,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        let ctx = TransitionContext {
            backorder: order.backorder_decision(),
            ..TransitionContext::default()
        };
        if let TransitionCheck::Denied { reason } =
            check_transition(order.status, OrderStatus::Confirmed, &ctx)
        {
            return Err(invalid_state(order.status, reason));
        }

        let actor_ref = actor.as_ref();
        // Version-guarded so a shortfall reported between read and write
        // cannot slip past the backorder check above
        let predicate =
            UpdatePredicate::status(OrderStatus::AwaitingApproval).with_version(order.version);
        let outcome = self
            .store
            .conditional_update(
                order_id,
                predicate,
                Box::new(move |order| {
                    order.transition_to(
                        OrderStatus::Confirmed,
                        &actor_ref,
                        notes.or_else(|| Some("Order confirmed".to_string())),
                        Utc::now(),
                    );
                    order.backorder_resolution = None;
                }),
            )
            .await?;

        let updated = match outcome {
            UpdateOutcome::Applied(order) => order,
            UpdateOutcome::NotApplied(snapshot) => {
                return Err(match snapshot.status {
                    OrderStatus::Confirmed => {
                        invalid_state(snapshot.status, "order is already confirmed")
                    }
                    OrderStatus::AwaitingApproval if snapshot.has_pending_backorder() => {
                        invalid_state(
                            snapshot.status,
                            "order has a pending backorder decision that blocks confirmation",
                        )
                    }
                    OrderStatus::AwaitingApproval => {
                        conflict("order changed while confirming; refresh and retry")
                    }
                    status => invalid_state(status, format!("no transition from {status} to confirmed")),
                });
            }
        };

        info!(order_id = %order_id, order_number = %updated.order_number, "Order confirmed");
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::STATUS_CHANGED,
                actor.as_ref(),
                json!({ "from": OrderStatus::AwaitingApproval, "to": OrderStatus::Confirmed }),
            )
            .for_order(order_id),
        )
        .await;
        emit_notification(
            &self.notifications,
            &NotificationEvent::OrderConfirmed {
                order_id,
                order_number: updated.order_number.clone(),
                customer_name: updated.customer_name.clone(),
            },
        )
        .await;
        Ok(updated)
    }

    /// Cancel an order from any non-terminal state.
    ///
    /// Idempotent: cancelling an already-cancelled order returns it
    /// unchanged. A delivered order cancels only under
    /// [`CancelOptions::force_delivered`]. Driver claim fields are cleared
    /// in the same write.
    #[instrument(skip(self, actor, reason), fields(order_id = %order_id, actor = %actor.id))]
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: &str,
        options: CancelOptions,
    ) -> Result<Order> {
        validate_cancellation_reason(reason)?;
        let order = self.load(order_id).await?;
        if order.status == OrderStatus::Cancelled {
            return Ok(order);
        }

        let ctx = TransitionContext {
            backorder: order.backorder_decision(),
            allow_cancel_delivered: options.force_delivered,
        };
        if let TransitionCheck::Denied { reason } =
            check_transition(order.status, OrderStatus::Cancelled, &ctx)
        {
            return Err(invalid_state(order.status, reason));
        }

        let mut allowed: Vec<OrderStatus> = status_groups::CANCELLABLE_STATUSES.to_vec();
        if options.force_delivered {
            allowed.push(OrderStatus::Delivered);
        }
        let from_status = order.status;
        let actor_ref = actor.as_ref();
        let note = format!("Cancelled: {}", reason.trim());
        let outcome = self
            .store
            .conditional_update(
                order_id,
                UpdatePredicate::status_in(&allowed),
                Box::new(move |order| {
                    order.transition_to(OrderStatus::Cancelled, &actor_ref, Some(note), Utc::now());
                    order.delivery.clear_claim();
                }),
            )
            .await?;

        let updated = match outcome {
            UpdateOutcome::Applied(order) => order,
            UpdateOutcome::NotApplied(snapshot) => {
                return match snapshot.status {
                    // Another actor cancelled first; the intent is satisfied
                    OrderStatus::Cancelled => Ok(snapshot),
                    OrderStatus::Delivered => Err(invalid_state(
                        snapshot.status,
                        "delivered orders can only be cancelled with explicit confirmation",
                    )),
                    _ => Err(conflict("order changed while cancelling; refresh and retry")),
                };
            }
        };

        info!(order_id = %order_id, from = %from_status, reason = reason, "Order cancelled");
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::STATUS_CHANGED,
                actor.as_ref(),
                json!({
                    "from": from_status,
                    "to": OrderStatus::Cancelled,
                    "reason": reason,
                    "forced": options.force_delivered,
                }),
            )
            .for_order(order_id),
        )
        .await;
        Ok(updated)
    }

    /// Admin path to `delivered`, bypassing the driver claim flow.
    ///
    /// The same-day-packed rule is enforced before the conditional write so
    /// a violation can never leave a partially applied transition.
    /// Idempotent on already-delivered orders.
    #[instrument(skip(self, actor, notes), fields(order_id = %order_id, actor = %actor.id))]
    pub async fn mark_delivered(
        &self,
        actor: &Actor,
        order_id: OrderId,
        notes: Option<String>,
        options: MarkDeliveredOptions,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        if order.status == OrderStatus::Delivered {
            return Ok(order);
        }
        if !order.status.is_deliverable() {
            return Err(invalid_state(
                order.status,
                format!("no transition from {} to delivered", order.status),
            ));
        }
        if !options.admin_override {
            let today = Utc::now().date_naive();
            if !order.packing.packed_on(today) {
                return Err(validation(
                    "order was not packed today; use the admin override to mark it delivered anyway",
                ));
            }
        }

        let from_status = order.status;
        let actor_ref = actor.as_ref();
        let outcome = self
            .store
            .conditional_update(
                order_id,
                UpdatePredicate::status_in(&[
                    OrderStatus::ReadyForDelivery,
                    OrderStatus::OutForDelivery,
                ]),
                Box::new(move |order| {
                    let now = Utc::now();
                    if order.delivery.delivered_at.is_none() {
                        order.delivery.delivered_at = Some(now);
                    }
                    order.transition_to(
                        OrderStatus::Delivered,
                        &actor_ref,
                        notes.or_else(|| Some("Marked delivered".to_string())),
                        now,
                    );
                }),
            )
            .await?;

        let updated = match outcome {
            UpdateOutcome::Applied(order) => order,
            UpdateOutcome::NotApplied(snapshot) => {
                return match snapshot.status {
                    OrderStatus::Delivered => Ok(snapshot),
                    OrderStatus::Cancelled => Err(invalid_state(
                        snapshot.status,
                        "cancelled orders cannot be marked delivered",
                    )),
                    _ => Err(conflict(
                        "order changed while marking delivered; refresh and retry",
                    )),
                };
            }
        };

        info!(order_id = %order_id, from = %from_status, "Order marked delivered");
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::STATUS_CHANGED,
                actor.as_ref(),
                json!({
                    "from": from_status,
                    "to": OrderStatus::Delivered,
                    "admin_override": options.admin_override,
                }),
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

    /// Approve a pending backorder, fully or with reduced quantities.
    ///
    /// Partial approval rewrites the affected line quantities and recomputes
    /// totals (GST included) in the same atomic write that records the
    /// resolution and clears the shortfall. Approval never confirms the
    /// order; that stays a separate call.
    #[instrument(skip(self, actor, approval), fields(order_id = %order_id, actor = %actor.id))]
    pub async fn approve_backorder(
        &self,
        actor: &Actor,
        order_id: OrderId,
        approval: BackorderApproval,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        Self::ensure_pending_backorder(&order)?;
        let extent = match &approval.approved_quantities {
            Some(quantities) => {
                validate_approved_quantities(&order, quantities, approval.bypass_stock_check)?
            }
            None => ApprovalExtent::Full,
        };

        let actor_ref = actor.as_ref();
        let gst_rate = self.config.pricing.gst_rate;
        let quantities = approval.approved_quantities.clone().unwrap_or_default();
        let estimated = approval.estimated_fulfillment;
        let notes = approval.notes.clone();
        let predicate =
            UpdatePredicate::status(OrderStatus::AwaitingApproval).with_version(order.version);
        let outcome = self
            .store
            .conditional_update(
                order_id,
                predicate,
                Box::new(move |order| {
                    let now = Utc::now();
                    let (resolution, note) = match extent {
                        ApprovalExtent::Full => (
                            BackorderResolution::approved(actor_ref.clone(), estimated, notes),
                            "Backorder approved".to_string(),
                        ),
                        ApprovalExtent::Partial => {
                            for item in &mut order.items {
                                if let Some(&approved) = quantities.get(&item.product_id) {
                                    item.quantity = approved;
                                }
                            }
                            order.recompute_totals(gst_rate);
                            (
                                BackorderResolution::partially_approved(
                                    actor_ref.clone(),
                                    quantities,
                                    estimated,
                                    notes,
                                ),
                                "Backorder partially approved".to_string(),
                            )
                        }
                    };
                    order.backorder_resolution = Some(resolution);
                    order.stock_shortfall = None;
                    order.append_history_note(&actor_ref, note, now);
                }),
            )
            .await?;

        let updated = match outcome {
            UpdateOutcome::Applied(order) => order,
            UpdateOutcome::NotApplied(snapshot) => {
                return Err(Self::classify_backorder_loss(&snapshot));
            }
        };

        info!(order_id = %order_id, extent = ?extent, "Backorder approved");
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::BACKORDER_DECIDED,
                actor.as_ref(),
                json!({
                    "decision": updated.backorder_decision(),
                    "approved_quantities": approval.approved_quantities.clone(),
                    "estimated_fulfillment": approval.estimated_fulfillment,
                }),
            )
            .for_order(order_id),
        )
        .await;
        let event = match extent {
            ApprovalExtent::Full => NotificationEvent::BackorderApproved {
                order_id,
                order_number: updated.order_number.clone(),
                estimated_fulfillment: approval.estimated_fulfillment,
            },
            ApprovalExtent::Partial => NotificationEvent::BackorderPartiallyApproved {
                order_id,
                order_number: updated.order_number.clone(),
                approved_quantities: approval.approved_quantities.unwrap_or_default(),
            },
        };
        emit_notification(&self.notifications, &event).await;
        Ok(updated)
    }

    /// Reject a pending backorder with a substantive reason.
    ///
    /// Resolves the sub-state without touching `status`; the usual follow-up
    /// is a human-operated cancellation.
    #[instrument(skip(self, actor, reason), fields(order_id = %order_id, actor = %actor.id))]
    pub async fn reject_backorder(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: &str,
    ) -> Result<Order> {
        validate_rejection_reason(reason)?;
        let order = self.load(order_id).await?;
        Self::ensure_pending_backorder(&order)?;

        let actor_ref = actor.as_ref();
        let reason_owned = reason.trim().to_string();
        let predicate =
            UpdatePredicate::status(OrderStatus::AwaitingApproval).with_version(order.version);
        let outcome = self
            .store
            .conditional_update(
                order_id,
                predicate,
                Box::new(move |order| {
                    let now = Utc::now();
                    let note = format!("Backorder rejected: {reason_owned}");
                    order.backorder_resolution =
                        Some(BackorderResolution::rejected(actor_ref.clone(), reason_owned));
                    order.stock_shortfall = None;
                    order.append_history_note(&actor_ref, note, now);
                }),
            )
            .await?;

        let updated = match outcome {
            UpdateOutcome::Applied(order) => order,
            UpdateOutcome::NotApplied(snapshot) => {
                return Err(Self::classify_backorder_loss(&snapshot));
            }
        };

        info!(order_id = %order_id, "Backorder rejected");
        emit_audit(
            &self.audit,
            AuditRecord::new(
                audit::BACKORDER_DECIDED,
                actor.as_ref(),
                json!({ "decision": BackorderDecision::Rejected, "reason": reason }),
            )
            .for_order(order_id),
        )
        .await;
        emit_notification(
            &self.notifications,
            &NotificationEvent::BackorderRejected {
                order_id,
                order_number: updated.order_number.clone(),
                reason: reason.trim().to_string(),
            },
        )
        .await;
        Ok(updated)
    }

    fn ensure_pending_backorder(order: &Order) -> Result<()> {
        if order.status != OrderStatus::AwaitingApproval {
            return Err(invalid_state(
                order.status,
                "backorder decisions apply only to awaiting-approval orders",
            ));
        }
        match order.backorder_decision() {
            BackorderDecision::PendingApproval => Ok(()),
            BackorderDecision::None => Err(invalid_state(
                order.status,
                "order has no stock shortfall to decide",
            )),
            decision => Err(invalid_state(
                order.status,
                format!("backorder was already {decision}"),
            )),
        }
    }

    fn classify_backorder_loss(snapshot: &Order) -> crate::error::FulfillmentError {
        if snapshot.status == OrderStatus::AwaitingApproval {
            conflict("backorder state changed while deciding; refresh and retry")
        } else {
            invalid_state(
                snapshot.status,
                "backorder decisions apply only to awaiting-approval orders",
            )
        }
    }
}
