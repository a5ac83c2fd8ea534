//! Input validation for fulfillment operations
//!
//! Fail-fast checks on caller-supplied input, run before any store round
//! trip. Business rules that depend on the current row (status, ownership,
//! same-day packing) live in the services; everything here is pure.

use crate::constants::system;
use crate::error::{validation, Result};
use crate::models::{AreaId, Order, OrderItem, ProductId};
use std::collections::BTreeMap;

/// Maximum accepted length for a proof-of-delivery file URL
const MAX_PROOF_URL_LENGTH: usize = 2048;

/// How much of the backorder a set of approved quantities covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalExtent {
    /// Every line keeps its requested quantity
    Full,
    /// At least one line was reduced
    Partial,
}

/// Validates a cancellation reason
pub fn validate_cancellation_reason(reason: &str) -> Result<()> {
    if reason.trim().is_empty() {
        return Err(validation("cancellation reason must not be empty"));
    }
    Ok(())
}

/// Validates a backorder rejection reason
pub fn validate_rejection_reason(reason: &str) -> Result<()> {
    let trimmed = reason.trim();
    if trimmed.len() < system::MIN_REJECTION_REASON_LEN {
        return Err(validation(format!(
            "rejection reason must be at least {} characters",
            system::MIN_REJECTION_REASON_LEN
        )));
    }
    Ok(())
}

/// Validates a return-to-warehouse reason
pub fn validate_return_reason(reason: &str) -> Result<()> {
    if reason.trim().is_empty() {
        return Err(validation("return reason must not be empty"));
    }
    Ok(())
}

/// Validates a proof-of-delivery file URL
pub fn validate_proof_url(file_url: &str) -> Result<()> {
    let trimmed = file_url.trim();
    if trimmed.is_empty() {
        return Err(validation("proof of delivery file URL must not be empty"));
    }
    if trimmed.len() > MAX_PROOF_URL_LENGTH {
        return Err(validation(format!(
            "proof of delivery file URL too long: {} chars (max: {})",
            trimmed.len(),
            MAX_PROOF_URL_LENGTH
        )));
    }
    Ok(())
}

/// Validates order lines at creation time
pub fn validate_order_items(items: &[OrderItem]) -> Result<()> {
    if items.is_empty() {
        return Err(validation("order must have at least one line"));
    }
    for item in items {
        if item.quantity == 0 {
            return Err(validation(format!(
                "quantity for {} must be greater than zero",
                item.product_id
            )));
        }
        if item.unit_price_cents < 0 {
            return Err(validation(format!(
                "unit price for {} must not be negative",
                item.product_id
            )));
        }
    }
    Ok(())
}

/// Validates approved backorder quantities against the order.
///
/// Each quantity must target a line on the order, be positive, and not
/// exceed the requested quantity. Unless `bypass_stock_check` is set, a
/// quantity for a shorted line must also fit within reported availability.
/// Lines not mentioned keep their requested quantity.
pub fn validate_approved_quantities(
    order: &Order,
    quantities: &BTreeMap<ProductId, u32>,
    bypass_stock_check: bool,
) -> Result<ApprovalExtent> {
    if quantities.is_empty() {
        return Err(validation("approved quantities must not be empty"));
    }

    for (product_id, &approved) in quantities {
        let Some(requested) = order.requested_quantity(product_id) else {
            return Err(validation(format!(
                "product {product_id} is not on this order"
            )));
        };
        if approved == 0 {
            return Err(validation(format!(
                "approved quantity for {product_id} must be greater than zero"
            )));
        }
        if approved > requested {
            return Err(validation(format!(
                "approved quantity {approved} for {product_id} exceeds requested {requested}"
            )));
        }
        if !bypass_stock_check {
            if let Some(available) = order
                .stock_shortfall
                .as_ref()
                .and_then(|shortfall| shortfall.available_for(product_id))
            {
                if approved > available {
                    return Err(validation(format!(
                        "approved quantity {approved} for {product_id} exceeds available stock {available}"
                    )));
                }
            }
        }
    }

    let reduced = order.items.iter().any(|item| {
        quantities
            .get(&item.product_id)
            .is_some_and(|&approved| approved < item.quantity)
    });
    Ok(if reduced {
        ApprovalExtent::Partial
    } else {
        ApprovalExtent::Full
    })
}

/// Validates a driver's replacement area set
pub fn validate_area_set(areas: &[AreaId]) -> Result<()> {
    if areas.len() > system::MAX_AREAS_PER_DRIVER {
        return Err(validation(format!(
            "a driver can cover at most {} area",
            system::MAX_AREAS_PER_DRIVER
        )));
    }
    for area in areas {
        if area.as_str().trim().is_empty() {
            return Err(validation("area id must not be empty"));
        }
    }
    Ok(())
}
