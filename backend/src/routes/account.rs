use std::sync::Arc;

use axum::{routing::get, Extension, Json, Router};
use tokenless_common::User;

use super::Caller;
use crate::AppState;

/// GET /api/me - The caller's own user record
async fn me(Extension(caller): Extension<Caller>) -> Json<User> {
    Json(caller.0)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/me", get(me)).with_state(state)
}
