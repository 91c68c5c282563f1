//! Meal request routes (`/api/meal-requests`).

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokenless_common::{BlockStatus, MealRequest, MealType, RequestFilter, RequestStatus};

use super::Caller;
use crate::error::{Error, Result};
use crate::meals::NewMealRequest;
use crate::AppState;

/// POST /api/meal-requests - Submit a new request
async fn create_request(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: std::result::Result<Json<NewMealRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MealRequest>)> {
    let Json(input) = body?;
    if let Some(student_id) = input.student_id.as_deref() {
        caller.require_access_to(student_id)?;
    }

    let request = state.admission.admit(&input)?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Query parameters for listing requests.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    student_id: Option<String>,
    status: Option<String>,
    meal_type: Option<String>,
}

/// GET /api/meal-requests - List requests, newest first
///
/// Students only ever see their own requests. A filter value that names no
/// known status or meal type matches nothing.
async fn list_requests(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MealRequest>>> {
    let student_id = if caller.is_staff() {
        query.student_id.filter(|id| !id.is_empty())
    } else {
        Some(caller.uid().to_string())
    };

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(value) => match value.parse::<RequestStatus>() {
            Ok(status) => Some(status),
            Err(_) => return Ok(Json(Vec::new())),
        },
        None => None,
    };
    let meal_type = match query.meal_type.as_deref().filter(|m| !m.is_empty()) {
        Some(value) => match value.parse::<MealType>() {
            Ok(meal_type) => Some(meal_type),
            Err(_) => return Ok(Json(Vec::new())),
        },
        None => None,
    };

    let filter = RequestFilter {
        student_id,
        status,
        meal_type,
    };
    Ok(Json(state.lifecycle.list(&filter)?))
}

/// GET /api/meal-requests/:id
async fn get_request(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<String>,
) -> Result<Json<MealRequest>> {
    let request = state.lifecycle.get(&request_id)?;
    caller.require_access_to(&request.student_id)?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusBody {
    #[serde(default)]
    status: Option<String>,
}

/// PUT /api/meal-requests/:id - Accept or deny a request (staff)
async fn update_status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<String>,
    body: std::result::Result<Json<UpdateStatusBody>, JsonRejection>,
) -> Result<Json<MealRequest>> {
    caller.require_staff()?;
    let Json(body) = body?;
    let status = body.status.unwrap_or_default();

    Ok(Json(state.lifecycle.update_status(&request_id, &status)?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    message: &'static str,
    deleted_request: MealRequest,
}

/// DELETE /api/meal-requests/:id - Dismiss a request (staff)
async fn delete_request(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    caller.require_staff()?;
    let deleted_request = state.lifecycle.delete(&request_id)?;
    Ok(Json(DeleteResponse {
        message: "Request deleted successfully",
        deleted_request,
    }))
}

#[derive(Debug, Deserialize)]
struct SetBlockBody {
    #[serde(default, rename = "isBlocked")]
    is_blocked: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetBlockResponse {
    message: &'static str,
    modified_count: usize,
}

/// PUT /api/meal-requests/student-block/:student_id (staff)
async fn set_block(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(student_id): Path<String>,
    body: std::result::Result<Json<SetBlockBody>, JsonRejection>,
) -> Result<Json<SetBlockResponse>> {
    caller.require_staff()?;
    let is_blocked = body
        .ok()
        .and_then(|Json(body)| body.is_blocked)
        .ok_or_else(|| Error::InvalidInput("isBlocked must be a boolean".to_string()))?;

    let modified_count = state.lifecycle.set_blocked(&student_id, is_blocked)?;
    Ok(Json(SetBlockResponse {
        message: if is_blocked {
            "Student blocked"
        } else {
            "Student unblocked"
        },
        modified_count,
    }))
}

/// GET /api/meal-requests/student-block/:student_id (staff)
async fn block_status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(student_id): Path<String>,
) -> Result<Json<BlockStatus>> {
    caller.require_staff()?;
    Ok(Json(state.lifecycle.block_status(&student_id)?))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route(
            "/student-block/:student_id",
            get(block_status).put(set_block),
        )
        .route(
            "/:id",
            get(get_request).put(update_status).delete(delete_request),
        )
        .with_state(state)
}
