use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tokenless_common::RequestStatus;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    database: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database: if state.store.ping() { "ok" } else { "unavailable" },
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let version = env!("CARGO_PKG_VERSION");
    let mut body = format!(
        "# HELP tokenless_up Whether the service is up\n\
         # TYPE tokenless_up gauge\n\
         tokenless_up 1\n\
         # HELP tokenless_info Service information\n\
         # TYPE tokenless_info gauge\n\
         tokenless_info{{version=\"{}\"}} 1\n",
        version
    );

    // Gauges backed by the store are left out while it is unreachable.
    match state.store.count_requests(RequestStatus::Pending) {
        Ok(count) => body.push_str(&format!(
            "# HELP tokenless_pending_requests Meal requests waiting for a decision\n\
             # TYPE tokenless_pending_requests gauge\n\
             tokenless_pending_requests {}\n",
            count
        )),
        Err(e) => tracing::warn!("Failed to count pending requests: {}", e),
    }
    match state.store.count_pending_onboarding() {
        Ok(count) => body.push_str(&format!(
            "# HELP tokenless_pending_onboarding Users waiting for onboarding approval\n\
             # TYPE tokenless_pending_onboarding gauge\n\
             tokenless_pending_onboarding {}\n",
            count
        )),
        Err(e) => tracing::warn!("Failed to count pending onboarding: {}", e),
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::test_util::{test_config, StaticIdentity};
    use axum::body::{to_bytes, Body};
    use http::Request;
    use tower::ServiceExt;

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_unreachable_store_omits_store_gauges() {
        // A regular file where the database directory should be.
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let store = Store::new(&blocker.join("tokenless.db").to_string_lossy());

        let state = Arc::new(AppState::new(
            test_config(),
            Arc::new(StaticIdentity::new()),
            Arc::new(store),
        ));

        let (status, text) = get_text(router(state.clone()), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("tokenless_up 1"));
        assert!(!text.contains("tokenless_pending_requests"));
        assert!(!text.contains("tokenless_pending_onboarding"));

        let (status, text) = get_text(router(state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("\"database\":\"unavailable\""));
    }
}
