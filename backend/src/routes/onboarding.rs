//! Onboarding approval routes (`/api/onboarding`, staff only).

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    middleware,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokenless_common::{PendingOnboarding, User};

use super::require_staff;
use crate::error::Result;
use crate::onboarding::OnboardingOutcome;
use crate::AppState;

/// GET /api/onboarding - Students waiting for approval, newest first
async fn list_pending(State(state): State<Arc<AppState>>) -> Result<Json<PendingOnboarding>> {
    Ok(Json(state.onboarding.list_pending()?))
}

#[derive(Debug, Deserialize)]
struct DecisionBody {
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    action: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DecisionResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    student: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted_count: Option<usize>,
}

fn rejected(deleted_count: usize, message: &str) -> DecisionResponse {
    DecisionResponse {
        message: message.to_string(),
        student: None,
        deleted_count: Some(deleted_count),
    }
}

/// PUT /api/onboarding - Approve or reject a student
async fn decide(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<DecisionBody>, JsonRejection>,
) -> Result<Json<DecisionResponse>> {
    let Json(body) = body?;
    let uid = body.uid.unwrap_or_default();
    let action = body.action.unwrap_or_default();

    let response = match state.onboarding.decide(&uid, &action)? {
        OnboardingOutcome::Approved(student) => {
            let name = if student.display_name.is_empty() {
                student.email.clone()
            } else {
                student.display_name.clone()
            };
            DecisionResponse {
                message: format!("Student {} has been approved", name),
                student: Some(student),
                deleted_count: None,
            }
        }
        OnboardingOutcome::Rejected { deleted_count } => rejected(
            deleted_count,
            "Student onboarding request has been rejected",
        ),
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct DeleteBody {
    #[serde(default)]
    uid: Option<String>,
}

/// DELETE /api/onboarding - Remove a pending student
async fn remove(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<DeleteBody>, JsonRejection>,
) -> Result<Json<DecisionResponse>> {
    let Json(body) = body?;
    let uid = body.uid.filter(|uid| !uid.trim().is_empty()).ok_or_else(|| {
        crate::error::Error::InvalidInput("Missing required field: uid".to_string())
    })?;

    let deleted_count = state.onboarding.reject(&uid)?;
    Ok(Json(rejected(
        deleted_count,
        "Student onboarding request has been deleted",
    )))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_pending).put(decide).delete(remove))
        .route_layer(middleware::from_fn(require_staff))
        .with_state(state)
}
