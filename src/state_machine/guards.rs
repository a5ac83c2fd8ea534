//! Pure validation of order status transitions.
//!
//! `check_transition` is the single authority on which status edges exist. It
//! performs no I/O and touches no storage, so every edge of the state machine
//! is unit-testable in isolation. Business rules that depend on record
//! contents beyond the status itself (proof of delivery, packing day, driver
//! ownership, input shapes) belong to the service layer and surface as
//! validation or ownership errors rather than illegal-transition errors.

use super::states::{BackorderDecision, OrderStatus};

/// Record-level facts the guard needs beyond the bare status pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionContext {
    /// Derived backorder decision of the order under evaluation
    pub backorder: BackorderDecision,
    /// Policy flag: an operator explicitly confirmed cancelling a delivered order
    pub allow_cancel_delivered: bool,
}

/// Outcome of a transition check: allowed, or denied with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionCheck {
    Allowed,
    Denied { reason: String },
}

impl TransitionCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Denial reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied { reason } => Some(reason),
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }
}

/// Check whether `requested` is a legal next status from `current`.
///
/// Pure function over the edge table; the caller supplies the derived
/// backorder decision and the cancel-delivered policy flag through `ctx`.
pub fn check_transition(
    current: OrderStatus,
    requested: OrderStatus,
    ctx: &TransitionContext,
) -> TransitionCheck {
    use OrderStatus::*;

    match (current, requested) {
        // Confirmation is blocked while a backorder decision is outstanding
        (AwaitingApproval, Confirmed) => {
            if ctx.backorder.blocks_confirmation() {
                TransitionCheck::denied(
                    "order has a pending backorder decision that blocks confirmation",
                )
            } else {
                TransitionCheck::Allowed
            }
        }

        // Packing workflow edges, included here as preconditions for delivery
        (Confirmed, Packing) => TransitionCheck::Allowed,
        (Packing, ReadyForDelivery) => TransitionCheck::Allowed,

        // Driver claim and completion edges
        (ReadyForDelivery, OutForDelivery) => TransitionCheck::Allowed,
        (OutForDelivery, Delivered) => TransitionCheck::Allowed,
        // Driver returns the order to the warehouse for a later re-attempt
        (OutForDelivery, ReadyForDelivery) => TransitionCheck::Allowed,
        // Admin marks delivered without the driver flow
        (ReadyForDelivery, Delivered) => TransitionCheck::Allowed,

        // Cancellation from any non-terminal state; delivered only under the
        // explicit force policy
        (Delivered, Cancelled) => {
            if ctx.allow_cancel_delivered {
                TransitionCheck::Allowed
            } else {
                TransitionCheck::denied(
                    "delivered orders can only be cancelled with explicit confirmation",
                )
            }
        }
        (Cancelled, Cancelled) => TransitionCheck::denied("order is already cancelled"),
        (from, Cancelled) if !from.is_terminal() => TransitionCheck::Allowed,

        (from, to) => TransitionCheck::denied(format!(
            "no transition from {from} to {to}"
        )),
    }
}
