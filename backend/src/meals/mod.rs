//! Meal request admission and lifecycle.
//!
//! - [`IdentityGate`] decides whether a student may submit requests at all.
//! - [`AdmissionController`] validates a submission and mints the request.
//! - [`LifecycleManager`] moves requests between states, deletes them, and
//!   toggles a student's block flag.

mod admission;
mod gate;
mod lifecycle;
pub mod token;

pub use admission::{AdmissionController, NewMealRequest};
pub use gate::{GateDecision, IdentityGate};
pub use lifecycle::LifecycleManager;
