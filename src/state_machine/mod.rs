// State machine module for order fulfillment
//
// Pure status model for the order lifecycle: the status enum, the derived
// backorder decision, the transition guard, and the typed lifecycle events
// emitted after successful transitions. Everything here is side-effect free;
// the service layer in `fulfillment` owns the writes.

pub mod events;
pub mod guards;
pub mod states;

// Re-export main types for convenient access
pub use events::{DriverChange, NotificationEvent};
pub use guards::{check_transition, TransitionCheck, TransitionContext};
pub use states::{BackorderDecision, OrderStatus};
