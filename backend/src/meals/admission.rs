use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::Deserialize;
use tokenless_common::{MealRequest, MealType, RequestStatus};

use super::gate::{GateDecision, IdentityGate};
use super::token::{day_bucket, generate_token_id};
use crate::error::{Error, Result};
use crate::events::{EventBus, MealEvent};
use crate::store::{Store, StoreError};

/// Email recorded when the caller supplies none.
const UNKNOWN_EMAIL: &str = "unknown@email.com";

/// Body of a create-request call. Presence is validated by the controller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMealRequest {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub student_email: Option<String>,
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Validates and creates meal requests.
#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<Store>,
    gate: IdentityGate,
    events: EventBus,
}

impl AdmissionController {
    pub fn new(store: Arc<Store>, events: EventBus) -> Self {
        Self {
            gate: IdentityGate::new(store.clone()),
            store,
            events,
        }
    }

    /// Admit a new request using the server's local clock.
    pub fn admit(&self, input: &NewMealRequest) -> Result<MealRequest> {
        self.admit_at(input, Local::now())
    }

    /// Admit a new request as of `now`.
    ///
    /// Checks run in order and the first failure wins: required fields,
    /// meal type, block/onboarding state, then same-day duplicates. Nothing
    /// is written unless every check passes.
    pub fn admit_at(&self, input: &NewMealRequest, now: DateTime<Local>) -> Result<MealRequest> {
        let (Some(student_id), Some(student_name), Some(meal_type)) = (
            required(input.student_id.as_deref()),
            required(input.student_name.as_deref()),
            required(input.meal_type.as_deref()),
        ) else {
            return Err(Error::InvalidInput(
                "Missing required fields: studentId, studentName, mealType".to_string(),
            ));
        };

        let meal_type: MealType = meal_type.parse().map_err(|_| {
            Error::InvalidInput("Invalid meal type. Must be breakfast, lunch, or dinner".to_string())
        })?;

        match self.gate.check(student_id)? {
            GateDecision::Allowed => {}
            GateDecision::Blocked => {
                tracing::info!(student_id, "Rejected request from blocked student");
                return Err(Error::ForbiddenBlocked);
            }
            GateDecision::NotOnboarded => return Err(Error::NotOnboarded),
        }

        let today = now.date_naive();
        let bucket = day_bucket(today);
        if self
            .store
            .find_pending_request(student_id, meal_type, &bucket)?
            .is_some()
        {
            return Err(Error::ConflictDuplicate(meal_type.to_string()));
        }

        let token_id = generate_token_id(meal_type, student_id, today, &mut rand::thread_rng());
        let timestamp = now.with_timezone(&Utc);
        let request = MealRequest {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            student_name: student_name.to_string(),
            student_email: required(input.student_email.as_deref())
                .unwrap_or(UNKNOWN_EMAIL)
                .to_string(),
            meal_type,
            token_id,
            status: RequestStatus::Pending,
            is_blocked: false,
            requested_at: timestamp,
            updated_at: timestamp,
        };

        // The unique pending index catches a concurrent admission that passed
        // the duplicate check at the same time.
        match self.store.insert_request(&request, &bucket) {
            Ok(()) => {}
            Err(StoreError::Constraint(_)) => {
                return Err(Error::ConflictDuplicate(meal_type.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            request_id = %request.id,
            token_id = %request.token_id,
            student_id = %request.student_id,
            meal_type = %request.meal_type,
            "Meal request created"
        );
        self.events.publish(MealEvent::RequestCreated {
            request: request.clone(),
        });

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{insert_student, local_at};
    use chrono::Duration;

    fn controller() -> (AdmissionController, Arc<Store>, EventBus) {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let events = EventBus::new(16);
        (
            AdmissionController::new(store.clone(), events.clone()),
            store,
            events,
        )
    }

    fn input(student_id: &str, meal_type: &str) -> NewMealRequest {
        NewMealRequest {
            student_id: Some(student_id.to_string()),
            student_name: Some("Ada Lovelace".to_string()),
            meal_type: Some(meal_type.to_string()),
            student_email: Some("ada@example.com".to_string()),
        }
    }

    fn assert_token_shape(token: &str, prefix: &str) {
        assert!(token.starts_with(prefix), "{token}");
        let random = &token[prefix.len()..];
        assert_eq!(random.len(), 2, "{token}");
        assert!(random.chars().all(|c| c.is_ascii_digit()), "{token}");
    }

    #[test]
    fn test_breakfast_lunch_scenario() {
        let (controller, store, _) = controller();
        insert_student(&store, "u-abcd1234", true);
        let now = local_at(2025, 2, 21, 8, 30);

        let first = controller.admit_at(&input("u-abcd1234", "breakfast"), now).unwrap();
        assert_eq!(first.status, RequestStatus::Pending);
        assert!(!first.is_blocked);
        assert_eq!(first.meal_type, MealType::Breakfast);
        assert_token_shape(&first.token_id, "B-210225-1234-");

        let again = controller.admit_at(&input("u-abcd1234", "breakfast"), now + Duration::hours(1));
        assert!(matches!(again, Err(Error::ConflictDuplicate(m)) if m == "breakfast"));

        let lunch = controller.admit_at(&input("u-abcd1234", "lunch"), now).unwrap();
        assert_token_shape(&lunch.token_id, "L-210225-1234-");

        let stored = store.find_request(&first.id).unwrap().unwrap();
        assert_eq!(stored, first);
        assert_eq!(store.list_requests(&Default::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_next_day_is_a_new_bucket() {
        let (controller, store, _) = controller();
        insert_student(&store, "s1", true);
        let day_one = local_at(2025, 2, 21, 23, 50);

        controller.admit_at(&input("s1", "dinner"), day_one).unwrap();
        let day_two = controller
            .admit_at(&input("s1", "dinner"), day_one + Duration::minutes(20))
            .unwrap();
        assert!(day_two.token_id.starts_with("D-220225-"));
    }

    #[test]
    fn test_meal_type_is_normalised() {
        let (controller, store, _) = controller();
        insert_student(&store, "s1", true);
        let request = controller.admit(&input("s1", "LUNCH")).unwrap();
        assert_eq!(request.meal_type, MealType::Lunch);
        assert!(matches!(
            controller.admit(&input("s1", "Lunch")),
            Err(Error::ConflictDuplicate(_))
        ));
    }

    #[test]
    fn test_missing_fields_rejected_before_anything_else() {
        let (controller, _, _) = controller();
        let mut missing_name = input("s1", "lunch");
        missing_name.student_name = Some("   ".to_string());
        assert!(matches!(controller.admit(&missing_name), Err(Error::InvalidInput(_))));
        assert!(matches!(
            controller.admit(&NewMealRequest::default()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_invalid_meal_type() {
        let (controller, store, _) = controller();
        insert_student(&store, "s1", true);
        let err = controller.admit(&input("s1", "brunch")).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert!(err.to_string().contains("breakfast, lunch, or dinner"));
    }

    #[test]
    fn test_blocked_student_rejected_regardless_of_duplicates() {
        let (controller, store, _) = controller();
        insert_student(&store, "s1", true);
        controller.admit(&input("s1", "lunch")).unwrap();
        store.set_student_blocked("s1", true, Utc::now()).unwrap();

        assert!(matches!(controller.admit(&input("s1", "lunch")), Err(Error::ForbiddenBlocked)));
        assert!(matches!(controller.admit(&input("s1", "dinner")), Err(Error::ForbiddenBlocked)));
        assert_eq!(store.list_requests(&Default::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_not_onboarded_student_rejected() {
        let (controller, store, _) = controller();
        insert_student(&store, "s1", false);
        assert!(matches!(controller.admit(&input("s1", "lunch")), Err(Error::NotOnboarded)));
        assert!(matches!(controller.admit(&input("ghost", "lunch")), Err(Error::NotOnboarded)));
    }

    #[test]
    fn test_default_email_and_event() {
        let (controller, store, events) = controller();
        insert_student(&store, "s1", true);
        let mut rx = events.subscribe();

        let mut no_email = input("s1", "dinner");
        no_email.student_email = None;
        let request = controller.admit(&no_email).unwrap();
        assert_eq!(request.student_email, "unknown@email.com");

        match rx.try_recv().unwrap() {
            MealEvent::RequestCreated { request: published } => assert_eq!(published.id, request.id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_admissions_leave_one_pending() {
        let (controller, store, _) = controller();
        insert_student(&store, "s1", true);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let controller = controller.clone();
                std::thread::spawn(move || controller.admit(&input("s1", "breakfast")))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::ConflictDuplicate(_))));
    }
}
