//! Manager approval of newly registered students.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use tokenless_common::{PendingOnboarding, User};

use crate::error::{Error, Result};
use crate::events::{EventBus, MealEvent};
use crate::store::Store;

/// A manager's decision on a pending student.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingAction {
    Approve,
    Reject,
}

impl FromStr for OnboardingAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Ok(OnboardingAction::Approve),
            "reject" => Ok(OnboardingAction::Reject),
            _ => Err(Error::InvalidInput(
                r#"Invalid action. Must be "approve" or "reject""#.to_string(),
            )),
        }
    }
}

/// Outcome of [`OnboardingGate::decide`].
#[derive(Debug, Clone)]
pub enum OnboardingOutcome {
    Approved(User),
    Rejected { deleted_count: usize },
}

#[derive(Clone)]
pub struct OnboardingGate {
    store: Arc<Store>,
    events: EventBus,
}

impl OnboardingGate {
    pub fn new(store: Arc<Store>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Users not yet onboarded, most recent signups first.
    pub fn list_pending(&self) -> Result<PendingOnboarding> {
        let students = self.store.list_pending_onboarding()?;
        tracing::debug!("Fetched {} pending onboarding requests", students.len());
        Ok(PendingOnboarding {
            total: students.len(),
            students,
        })
    }

    /// Let a student submit meal requests.
    pub fn approve(&self, uid: &str) -> Result<User> {
        let student = self
            .store
            .approve_user(uid, Utc::now())?
            .ok_or_else(|| Error::NotFound("Student".to_string()))?;

        tracing::info!(uid, "Student approved for onboarding");
        self.events.publish(MealEvent::OnboardingApproved {
            student: student.clone(),
        });
        Ok(student)
    }

    /// Remove the user entirely; they must register again to retry.
    pub fn reject(&self, uid: &str) -> Result<usize> {
        let deleted_count = self.store.delete_user(uid)?;
        if deleted_count == 0 {
            return Err(Error::NotFound("Student".to_string()));
        }

        tracing::info!(uid, "Student rejected from onboarding");
        self.events.publish(MealEvent::OnboardingRejected {
            uid: uid.to_string(),
        });
        Ok(deleted_count)
    }

    /// Apply a parsed `action` to `uid`.
    pub fn decide(&self, uid: &str, action: &str) -> Result<OnboardingOutcome> {
        if uid.trim().is_empty() || action.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Missing required fields: uid, action".to_string(),
            ));
        }
        match action.parse()? {
            OnboardingAction::Approve => self.approve(uid).map(OnboardingOutcome::Approved),
            OnboardingAction::Reject => self
                .reject(uid)
                .map(|deleted_count| OnboardingOutcome::Rejected { deleted_count }),
        }
    }
}
