//! Driver-to-area assignment records.
//!
//! The active set is a strict pairing: at most one active assignment per
//! driver and at most one per area. The store's replace operation owns that
//! invariant because it spans multiple records and cannot be expressed as a
//! single-document conditional write. Reassignment deletes and recreates the
//! record wholesale rather than mutating it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque driver identifier issued by the external identity system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DriverId(String);

impl DriverId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geographic delivery zone identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AreaId(String);

impl AreaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Driver identity plus display name, as passed between assignment operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRef {
    pub id: DriverId,
    pub name: Option<String>,
}

impl DriverRef {
    pub fn new(id: DriverId, name: Option<String>) -> Self {
        Self { id, name }
    }
}

/// Active link between one driver and one delivery area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverAreaAssignment {
    pub driver_id: DriverId,
    pub driver_name: String,
    pub area_id: AreaId,
    pub assigned_at: DateTime<Utc>,
}

impl DriverAreaAssignment {
    pub fn new(driver_id: DriverId, driver_name: impl Into<String>, area_id: AreaId) -> Self {
        Self {
            driver_id,
            driver_name: driver_name.into(),
            area_id,
            assigned_at: Utc::now(),
        }
    }

    pub fn driver_ref(&self) -> DriverRef {
        DriverRef {
            id: self.driver_id.clone(),
            name: Some(self.driver_name.clone()),
        }
    }
}
