//! HTTP routes.
//!
//! Everything under `/api` requires a bearer token. The [`authenticate`]
//! middleware resolves the caller to a user record and stores it as a
//! [`Caller`] request extension; role checks build on that.

pub mod account;
pub mod admin;
pub mod health;
pub mod manager;
pub mod meal_requests;
pub mod onboarding;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    Extension, Router,
};
use tokenless_common::User;

use crate::error::{Error, Result};
use crate::AppState;

/// The authenticated user behind the current request.
#[derive(Debug, Clone)]
pub struct Caller(pub User);

impl Caller {
    pub fn uid(&self) -> &str {
        &self.0.uid
    }

    pub fn is_staff(&self) -> bool {
        self.0.role.is_staff()
    }

    pub fn require_staff(&self) -> Result<()> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(Error::Forbidden("Manager access required".to_string()))
        }
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.0.role == tokenless_common::Role::Admin {
            Ok(())
        } else {
            Err(Error::Forbidden("Admin access required".to_string()))
        }
    }

    /// Staff can act on any student; students only on themselves.
    pub fn require_access_to(&self, student_id: &str) -> Result<()> {
        if self.is_staff() || self.uid() == student_id {
            Ok(())
        } else {
            Err(Error::Forbidden(
                "Students can only access their own requests".to_string(),
            ))
        }
    }
}

/// Middleware that authenticates the caller and registers them on first sign-in.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let auth_user = state.identity.authenticate(request.headers()).await?;
    let user = state.users.sign_in(&auth_user)?;

    request.extensions_mut().insert(Caller(user));
    Ok(next.run(request).await)
}

/// Middleware that requires a manager or admin caller.
pub async fn require_staff(
    Extension(caller): Extension<Caller>,
    request: Request,
    next: Next,
) -> Result<Response> {
    caller.require_staff()?;
    Ok(next.run(request).await)
}

/// Middleware that requires an admin caller.
pub async fn require_admin(
    Extension(caller): Extension<Caller>,
    request: Request,
    next: Next,
) -> Result<Response> {
    caller.require_admin()?;
    Ok(next.run(request).await)
}

/// Build the `/api` router.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(account::router(state.clone()))
        .nest("/meal-requests", meal_requests::router(state.clone()))
        .nest("/manager", manager::router(state.clone()))
        .nest("/onboarding", onboarding::router(state.clone()))
        .nest("/admin", admin::router(state.clone()))
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router(state.clone()))
        .nest("/api", api_router(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokenless_common::Role;

    fn caller(uid: &str, role: Role) -> Caller {
        let now = Utc::now();
        Caller(User {
            uid: uid.to_string(),
            display_name: uid.to_string(),
            email: String::new(),
            role,
            is_onboarded: true,
            is_blocked: false,
            created_at: now,
            updated_at: now,
            approved_at: None,
        })
    }

    #[test]
    fn test_student_permissions() {
        let student = caller("s1", Role::Student);
        assert!(student.require_staff().is_err());
        assert!(student.require_admin().is_err());
        assert!(student.require_access_to("s1").is_ok());
        assert!(student.require_access_to("s2").is_err());
    }

    #[test]
    fn test_manager_permissions() {
        let manager = caller("m1", Role::Manager);
        assert!(manager.require_staff().is_ok());
        assert!(manager.require_admin().is_err());
        assert!(manager.require_access_to("s2").is_ok());
    }

    #[test]
    fn test_admin_permissions() {
        let admin = caller("a1", Role::Admin);
        assert!(admin.require_staff().is_ok());
        assert!(admin.require_admin().is_ok());
    }
}
