//! Tokenless Common Types
//!
//! Shared types for the meal request API: requests, users, roles and the
//! response envelopes returned by the backend.

pub mod meal;
pub mod user;

pub use meal::{BlockStatus, MealRequest, MealType, RequestFilter, RequestStatus};
pub use user::{PendingOnboarding, Role, User};

/// Failure to parse one of the string-backed enums.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind}: {value:?}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
