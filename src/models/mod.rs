//! # Data Models
//!
//! Domain types for the fulfillment core: the order aggregate with its
//! embedded delivery and packing records, driver/area assignment rows, and
//! the actor identities stamped onto history entries and audit events.

pub mod actor;
pub mod delivery;
pub mod driver_area;
pub mod order;

pub use actor::{Actor, ActorId, ActorRef, ActorRole};
pub use delivery::{DeliveryDetails, PackingDetails, ProofKind, ProofOfDelivery};
pub use driver_area::{AreaId, DriverAreaAssignment, DriverId, DriverRef};
pub use order::{
    BackorderResolution, Order, OrderId, OrderItem, OrderTotals, ProductId, ShortfallItem,
    StatusHistoryEntry, StockShortfall,
};
