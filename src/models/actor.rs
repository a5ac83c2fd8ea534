//! Acting identities: admins, sales operators, drivers, and the scheduler.
//!
//! Identity and role assignment live in an external identity system; this
//! crate only carries the opaque id, a display name, and the coarse role the
//! calling layer resolved. History entries and audit records embed the
//! lighter `ActorRef` projection.

use crate::models::DriverId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque actor identifier issued by the external identity system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse role resolved by the calling layer's identity integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Sales,
    Driver,
    /// Scheduled jobs and internal automation
    System,
}

/// An authenticated caller of a fulfillment operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub display_name: String,
    pub email: Option<String>,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        email: Option<String>,
        role: ActorRole,
    ) -> Self {
        Self {
            id: ActorId::new(id),
            display_name: display_name.into(),
            email,
            role,
        }
    }

    /// Actor used by scheduled jobs (auto-assignment runs under this identity)
    pub fn system() -> Self {
        Self {
            id: ActorId::new("system"),
            display_name: "System".to_string(),
            email: None,
            role: ActorRole::System,
        }
    }

    /// Projection embedded into history entries and audit records
    pub fn as_ref(&self) -> ActorRef {
        ActorRef {
            id: self.id.clone(),
            name: self.display_name.clone(),
            email: self.email.clone(),
        }
    }

    /// Driver identity of this actor; drivers authenticate with the same
    /// external id that order claims are recorded under.
    pub fn driver_id(&self) -> DriverId {
        DriverId::new(self.id.as_str())
    }
}

/// Who performed a change, as recorded on the change itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: ActorId,
    pub name: String,
    pub email: Option<String>,
}
