//! Delivery sub-record embedded in the order aggregate.
//!
//! `DeliveryDetails` has no identity of its own and no standalone repository;
//! it is owned exclusively by `Order` and mutated only through the lifecycle
//! and assignment operations. `delivery_sequence` is written by the external
//! route-optimization collaborator and only read here.

use crate::models::{DriverId, DriverRef};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of proof-of-delivery artifact a driver captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    Photo,
    Signature,
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Photo => write!(f, "photo"),
            Self::Signature => write!(f, "signature"),
        }
    }
}

/// Proof artifact required before a driver can complete a delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofOfDelivery {
    pub kind: ProofKind,
    pub file_url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Mutable delivery state owned by the order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub driver_id: Option<DriverId>,
    pub driver_name: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub proof_of_delivery: Option<ProofOfDelivery>,
    /// Stop position assigned by route optimization; read-only here
    pub delivery_sequence: Option<u32>,
    pub return_reason: Option<String>,
    pub return_notes: Option<String>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl DeliveryDetails {
    /// Check whether `driver` currently holds the claim on this order
    pub fn is_claimed_by(&self, driver: &DriverId) -> bool {
        self.driver_id.as_ref() == Some(driver)
    }

    /// Check whether any driver holds the claim
    pub fn is_claimed(&self) -> bool {
        self.driver_id.is_some()
    }

    /// Record a driver assignment or reassignment
    pub fn assign(&mut self, driver: &DriverRef, at: DateTime<Utc>) {
        self.driver_id = Some(driver.id.clone());
        self.driver_name = driver.name.clone();
        self.assigned_at = Some(at);
    }

    /// Drop the claim entirely (cancellation path)
    pub fn clear_claim(&mut self) {
        self.driver_id = None;
        self.driver_name = None;
        self.assigned_at = None;
        self.started_at = None;
    }
}

/// Packing workflow facts this core reads but never writes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PackingDetails {
    pub packed_at: Option<DateTime<Utc>>,
}

impl PackingDetails {
    /// Check whether the order was packed on the given calendar day (UTC)
    pub fn packed_on(&self, date: NaiveDate) -> bool {
        self.packed_at
            .map(|at| at.date_naive() == date)
            .unwrap_or(false)
    }
}
