//! # Error Taxonomy
//!
//! Every fulfillment operation returns one of these variants. The split
//! matters to callers: `Conflict` means the write lost a race and the same
//! call may succeed on retry after a re-read, `InvalidState` means the
//! transition is not legal from where the order sits now, and `Forbidden`
//! means this actor can never perform the operation. Storage errors carry
//! their own retryability.

use crate::state_machine::OrderStatus;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by fulfillment operations
#[derive(Error, Debug)]
pub enum FulfillmentError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid state: {reason} (order is {current})")]
    InvalidState {
        current: OrderStatus,
        reason: String,
    },

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FulfillmentError {
    /// Whether retrying the same call after a fresh read can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Storage(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias for fulfillment operations
pub type Result<T> = std::result::Result<T, FulfillmentError>;

/// Helper to build a not-found error for an order
pub fn order_not_found(id: impl ToString) -> FulfillmentError {
    FulfillmentError::NotFound {
        entity: "order",
        id: id.to_string(),
    }
}

/// Helper to build an invalid-state error
pub fn invalid_state(current: OrderStatus, reason: impl Into<String>) -> FulfillmentError {
    FulfillmentError::InvalidState {
        current,
        reason: reason.into(),
    }
}

/// Helper to build a conflict error
pub fn conflict(reason: impl Into<String>) -> FulfillmentError {
    FulfillmentError::Conflict {
        reason: reason.into(),
    }
}

/// Helper to build a forbidden error
pub fn forbidden(reason: impl Into<String>) -> FulfillmentError {
    FulfillmentError::Forbidden {
        reason: reason.into(),
    }
}

/// Helper to build a validation error
pub fn validation(reason: impl Into<String>) -> FulfillmentError {
    FulfillmentError::Validation {
        reason: reason.into(),
    }
}
