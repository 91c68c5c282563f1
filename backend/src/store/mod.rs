//! Persistence for users and meal requests.

mod sqlite;

pub use sqlite::{Store, StoreError, UserUpdate};
