use std::sync::Arc;

use chrono::Utc;
use tokenless_common::{BlockStatus, MealRequest, RequestFilter, RequestStatus};

use crate::error::{Error, Result};
use crate::events::{EventBus, MealEvent};
use crate::store::{Store, StoreError};

/// Status changes, deletion and block toggling for admitted requests.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<Store>,
    events: EventBus,
    allow_reopen: bool,
}

impl LifecycleManager {
    /// With `allow_reopen` any of the three status values is accepted
    /// unconditionally; otherwise only `pending -> accepted|denied` is legal.
    pub fn new(store: Arc<Store>, events: EventBus, allow_reopen: bool) -> Self {
        Self {
            store,
            events,
            allow_reopen,
        }
    }

    pub fn list(&self, filter: &RequestFilter) -> Result<Vec<MealRequest>> {
        Ok(self.store.list_requests(filter)?)
    }

    pub fn get(&self, id: &str) -> Result<MealRequest> {
        self.store
            .find_request(id)?
            .ok_or_else(|| Error::NotFound("Request".to_string()))
    }

    /// Move request `id` to `status`.
    pub fn update_status(&self, id: &str, status: &str) -> Result<MealRequest> {
        let target: RequestStatus = status.parse().map_err(|_| {
            Error::InvalidInput("Invalid status. Must be pending, accepted, or denied".to_string())
        })?;
        let now = Utc::now();

        let updated = if self.allow_reopen {
            match self.store.update_request_status(id, target, None, now) {
                Ok(Some(updated)) => updated,
                Ok(None) => return Err(Error::NotFound("Request".to_string())),
                // Reopening collides with another pending request for the same meal and day.
                Err(StoreError::Constraint(_)) => {
                    let current = self.get(id)?;
                    return Err(Error::ConflictDuplicate(current.meal_type.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            let current = self.get(id)?;
            if !current.status.can_transition_to(target) {
                return Err(Error::InvalidTransition {
                    from: current.status.to_string(),
                    to: target.to_string(),
                });
            }
            match self
                .store
                .update_request_status(id, target, Some(current.status), now)?
            {
                Some(updated) => updated,
                // Another manager decided or deleted it in between.
                None => {
                    let latest = self.get(id)?;
                    return Err(Error::InvalidTransition {
                        from: latest.status.to_string(),
                        to: target.to_string(),
                    });
                }
            }
        };

        tracing::info!(request_id = %id, status = %target, "Meal request status updated");
        self.events.publish(MealEvent::RequestUpdated {
            request: updated.clone(),
        });
        Ok(updated)
    }

    /// Delete a request in any state, returning the removed record.
    pub fn delete(&self, id: &str) -> Result<MealRequest> {
        let deleted = self
            .store
            .delete_request(id)?
            .ok_or_else(|| Error::NotFound("Request".to_string()))?;

        tracing::info!(
            request_id = %id,
            student = %deleted.student_name,
            "Meal request deleted"
        );
        self.events.publish(MealEvent::RequestDeleted {
            request: deleted.clone(),
        });
        Ok(deleted)
    }

    /// Block or unblock a student. Returns how many of the student's
    /// requests changed their flag.
    pub fn set_blocked(&self, student_id: &str, is_blocked: bool) -> Result<usize> {
        if student_id.trim().is_empty() {
            return Err(Error::InvalidInput("studentId is required".to_string()));
        }

        let modified = self
            .store
            .set_student_blocked(student_id, is_blocked, Utc::now())?;

        tracing::info!(student_id, is_blocked, modified, "Student block status set");
        self.events.publish(MealEvent::StudentBlocked {
            student_id: student_id.to_string(),
            is_blocked,
            modified_count: modified,
        });
        Ok(modified)
    }

    /// Block state and full request history of a student.
    ///
    /// Fails with not-found when the student has no requests at all.
    pub fn block_status(&self, student_id: &str) -> Result<BlockStatus> {
        let requests = self.store.list_requests(&RequestFilter {
            student_id: Some(student_id.to_string()),
            ..Default::default()
        })?;
        if requests.is_empty() {
            return Err(Error::NotFound("Requests for this student".to_string()));
        }

        let user_blocked = self
            .store
            .find_user(student_id)?
            .is_some_and(|user| user.is_blocked);
        let is_blocked = user_blocked || requests.iter().any(|r| r.is_blocked);

        Ok(BlockStatus {
            student_id: student_id.to_string(),
            is_blocked,
            total_requests: requests.len(),
            requests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{insert_request, insert_student};
    use tokenless_common::MealType;

    fn manager(allow_reopen: bool) -> (LifecycleManager, Arc<Store>) {
        let store = Arc::new(Store::open(":memory:").unwrap());
        (
            LifecycleManager::new(store.clone(), EventBus::new(16), allow_reopen),
            store,
        )
    }

    #[test]
    fn test_accept_pending_request() {
        let (manager, store) = manager(false);
        let before = insert_request(&store, "r1", "s1", MealType::Lunch, false);

        let accepted = manager.update_status("r1", "accepted").unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert!(accepted.updated_at >= before.updated_at);

        let fetched = manager.get("r1").unwrap();
        assert_eq!(fetched.status, RequestStatus::Accepted);
        assert_eq!(fetched.updated_at, accepted.updated_at);
    }

    #[test]
    fn test_unknown_status_value_is_invalid_input() {
        let (manager, store) = manager(false);
        insert_request(&store, "r1", "s1", MealType::Lunch, false);
        let err = manager.update_status("r1", "approved").unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert_eq!(manager.get("r1").unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn test_missing_request_is_not_found() {
        let (manager, _) = manager(false);
        assert!(matches!(manager.update_status("nope", "denied"), Err(Error::NotFound(_))));
        assert!(matches!(manager.get("nope"), Err(Error::NotFound(_))));
        assert!(matches!(manager.delete("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let (manager, store) = manager(false);
        insert_request(&store, "r1", "s1", MealType::Lunch, false);
        manager.update_status("r1", "denied").unwrap();

        for target in ["accepted", "denied", "pending"] {
            let err = manager.update_status("r1", target).unwrap_err();
            assert!(matches!(err, Error::InvalidTransition { .. }), "{target}");
        }
        assert_eq!(manager.get("r1").unwrap().status, RequestStatus::Denied);
    }

    #[test]
    fn test_allow_reopen_accepts_any_value() {
        let (manager, store) = manager(true);
        insert_request(&store, "r1", "s1", MealType::Lunch, false);
        manager.update_status("r1", "accepted").unwrap();
        let reopened = manager.update_status("r1", "pending").unwrap();
        assert_eq!(reopened.status, RequestStatus::Pending);
        assert!(matches!(manager.update_status("nope", "denied"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_reopen_blocked_by_pending_duplicate() {
        let (manager, store) = manager(true);
        insert_request(&store, "r1", "s1", MealType::Lunch, false);
        manager.update_status("r1", "accepted").unwrap();
        insert_request(&store, "r2", "s1", MealType::Lunch, false);

        let err = manager.update_status("r1", "pending").unwrap_err();
        assert_eq!(err.code(), "conflict_duplicate");
        assert_eq!(err.to_string(), "You already have a pending request for lunch today");
        assert_eq!(manager.get("r1").unwrap().status, RequestStatus::Accepted);
    }

    #[test]
    fn test_delete_from_any_state() {
        let (manager, store) = manager(false);
        insert_request(&store, "r1", "s1", MealType::Lunch, false);
        manager.update_status("r1", "accepted").unwrap();

        let deleted = manager.delete("r1").unwrap();
        assert_eq!(deleted.status, RequestStatus::Accepted);
        assert!(matches!(manager.get("r1"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_set_blocked_is_idempotent() {
        let (manager, store) = manager(false);
        insert_student(&store, "s1", true);
        insert_request(&store, "r1", "s1", MealType::Lunch, false);
        insert_request(&store, "r2", "s1", MealType::Dinner, false);
        insert_request(&store, "r3", "s2", MealType::Dinner, false);

        assert_eq!(manager.set_blocked("s1", true).unwrap(), 2);
        assert_eq!(manager.set_blocked("s1", true).unwrap(), 0);

        let status = manager.block_status("s1").unwrap();
        assert!(status.is_blocked);
        assert_eq!(status.total_requests, 2);
        assert!(status.requests.iter().all(|r| r.is_blocked));
        assert!(!manager.block_status("s2").unwrap().is_blocked);

        assert_eq!(manager.set_blocked("s1", false).unwrap(), 2);
        assert!(!manager.block_status("s1").unwrap().is_blocked);
    }

    #[test]
    fn test_block_status_without_requests_is_not_found() {
        let (manager, store) = manager(false);
        insert_student(&store, "s1", true);
        assert!(matches!(manager.block_status("s1"), Err(Error::NotFound(_))));
        assert!(matches!(manager.set_blocked(" ", true), Err(Error::InvalidInput(_))));
    }
}
