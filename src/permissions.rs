//! # Permissions
//!
//! Capability checks consulted at the operation surface. The core services
//! trust their callers; only the facade asks before dispatching, so an
//! embedding system can swap in its own identity backend by implementing
//! [`PermissionCheck`].

use crate::models::{Actor, ActorRole};
use std::fmt;

/// What an actor is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Confirm, cancel, and decide backorders; mark delivered
    ManageOrders,
    /// Claim, complete, and return deliveries
    DeliverOrders,
    /// Replace driver area coverage and run auto-assignment
    ManageDrivers,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::ManageOrders => "manage_orders",
            Capability::DeliverOrders => "deliver_orders",
            Capability::ManageDrivers => "manage_drivers",
        };
        write!(f, "{name}")
    }
}

/// Identity-system port for capability checks
pub trait PermissionCheck: Send + Sync {
    fn has(&self, actor: &Actor, capability: Capability) -> bool;
}

/// Role-table permission check used when no external identity system is wired
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRolePermissions;

impl PermissionCheck for StaticRolePermissions {
    fn has(&self, actor: &Actor, capability: Capability) -> bool {
        match (actor.role, capability) {
            (ActorRole::Admin | ActorRole::System, _) => true,
            (ActorRole::Sales, Capability::ManageOrders) => true,
            (ActorRole::Driver, Capability::DeliverOrders) => true,
            _ => false,
        }
    }
}
