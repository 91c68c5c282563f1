//! Error types surfaced by the meal services and the HTTP layer.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::AuthError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("You have been blocked from making requests")]
    ForbiddenBlocked,

    #[error("Your account is waiting for onboarding approval")]
    NotOnboarded,

    #[error("{0} not found")]
    NotFound(String),

    #[error("You already have a pending request for {0} today")]
    ConflictDuplicate(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Cannot move request from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Error {
    /// Stable machine-readable code for the error category.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::ForbiddenBlocked => "forbidden_blocked",
            Error::NotOnboarded => "not_onboarded",
            Error::NotFound(_) => "not_found",
            Error::ConflictDuplicate(_) => "conflict_duplicate",
            Error::Conflict(_) => "conflict",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) | Error::ForbiddenBlocked | Error::NotOnboarded => {
                StatusCode::FORBIDDEN
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ConflictDuplicate(_) | Error::Conflict(_) | Error::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Constraint(msg) => Error::Conflict(msg),
            other => {
                tracing::error!("Store failure: {}", other);
                Error::StoreUnavailable(other.to_string())
            }
        }
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Unauthorized(err.to_string())
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "type": self.code(),
                "message": self.to_string()
            }
        }));

        (self.status(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
