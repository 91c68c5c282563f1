//! Broadcast of meal request and onboarding changes for live dashboards.

use serde::Serialize;
use tokenless_common::{MealRequest, User};
use tokio::sync::broadcast;

/// Event emitted after a successful mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MealEvent {
    RequestCreated {
        request: MealRequest,
    },
    RequestUpdated {
        request: MealRequest,
    },
    RequestDeleted {
        request: MealRequest,
    },
    #[serde(rename_all = "camelCase")]
    StudentBlocked {
        student_id: String,
        is_blocked: bool,
        modified_count: usize,
    },
    OnboardingApproved {
        student: User,
    },
    OnboardingRejected {
        uid: String,
    },
}

impl MealEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            MealEvent::RequestCreated { .. } => "request_created",
            MealEvent::RequestUpdated { .. } => "request_updated",
            MealEvent::RequestDeleted { .. } => "request_deleted",
            MealEvent::StudentBlocked { .. } => "student_blocked",
            MealEvent::OnboardingApproved { .. } => "onboarding_approved",
            MealEvent::OnboardingRejected { .. } => "onboarding_rejected",
        }
    }
}

/// Cloneable handle to the event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MealEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: MealEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => tracing::debug!("Published {} to {} subscribers", name, receivers),
            Err(_) => tracing::trace!("Dropped {}: no subscribers", name),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MealEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new(4);
        bus.publish(MealEvent::OnboardingRejected { uid: "u1".to_string() });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        bus.publish(MealEvent::StudentBlocked {
            student_id: "s1".to_string(),
            is_blocked: true,
            modified_count: 3,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "student_blocked");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "student_blocked");
        assert_eq!(json["studentId"], "s1");
        assert_eq!(json["modifiedCount"], 3);
    }
}
