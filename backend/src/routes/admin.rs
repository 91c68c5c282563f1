//! Admin user management routes (`/api/admin`).

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokenless_common::User;

use super::require_admin;
use crate::error::Result;
use crate::users::{NewUser, UserPatch};
use crate::AppState;

/// Response for /api/admin/users endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UsersApiResponse {
    pub users: Vec<User>,
    pub total: usize,
}

/// GET /api/admin/users - List all users, newest first
async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<UsersApiResponse>> {
    let users = state.users.list(None)?;
    let total = users.len();
    Ok(Json(UsersApiResponse { users, total }))
}

/// POST /api/admin/users - Create a user
async fn create_user(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<User>)> {
    let Json(input) = body?;
    let user = state.users.create(&input)?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/admin/users/:uid
async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<User>> {
    Ok(Json(state.users.get(&uid)?))
}

/// PUT /api/admin/users/:uid - Update name, email, role or onboarding flag
async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    body: std::result::Result<Json<UserPatch>, JsonRejection>,
) -> Result<Json<User>> {
    let Json(patch) = body?;
    Ok(Json(state.users.update(&uid, &patch)?))
}

#[derive(Debug, Serialize)]
struct DeleteUserResponse {
    message: &'static str,
}

/// DELETE /api/admin/users/:uid
async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<DeleteUserResponse>> {
    state.users.delete(&uid)?;
    Ok(Json(DeleteUserResponse {
        message: "User deleted successfully",
    }))
}

/// Build the admin router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:uid",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route_layer(middleware::from_fn(require_admin))
        .with_state(state)
}
