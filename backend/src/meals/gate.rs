use std::sync::Arc;

use crate::store::{Store, StoreError};

/// Whether a student may submit new meal requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Blocked,
    NotOnboarded,
}

/// Read-only admission check on a student's account state.
#[derive(Clone)]
pub struct IdentityGate {
    store: Arc<Store>,
}

impl IdentityGate {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Decide for `student_id`.
    ///
    /// Blocked wins over everything else. A student is blocked when their
    /// user record says so or when any of their stored requests carries the
    /// block flag. An unknown student is treated as not onboarded.
    pub fn check(&self, student_id: &str) -> Result<GateDecision, StoreError> {
        let user = self.store.find_user(student_id)?;

        let blocked = match &user {
            Some(user) if user.is_blocked => true,
            _ => self.store.has_blocked_request(student_id)?,
        };
        if blocked {
            return Ok(GateDecision::Blocked);
        }

        match user {
            Some(user) if user.is_onboarded => Ok(GateDecision::Allowed),
            _ => Ok(GateDecision::NotOnboarded),
        }
    }
}
