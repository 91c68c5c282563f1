//! Manager dashboard routes (`/api/manager`).
//!
//! Provides:
//! - Student list (`/api/manager/students`)
//! - SSE stream of meal and onboarding events (`/api/manager/events`)

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::stream::Stream;
use tokenless_common::{Role, User};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use super::require_staff;
use crate::error::Result;
use crate::AppState;

/// GET /api/manager/students - All users with the student role
async fn list_students(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>> {
    Ok(Json(state.users.list(Some(Role::Student))?))
}

/// GET /api/manager/events - SSE stream of meal events
async fn meal_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.events.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(data) => Some(Ok(Event::default().event(event.name()).data(data))),
            Err(e) => {
                tracing::warn!("Failed to serialize {}: {}", event.name(), e);
                None
            }
        },
        Err(_) => None, // Skip lagged errors
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/students", get(list_students))
        .route("/events", get(meal_events))
        .route_layer(middleware::from_fn(require_staff))
        .with_state(state)
}
