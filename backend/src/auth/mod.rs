//! Caller authentication.
//!
//! The `IdentityProvider` trait turns request headers into an [`AuthUser`].
//! Production uses [`JwksClient`], which validates OIDC bearer tokens.

mod jwks;

pub use jwks::JwksClient;

use async_trait::async_trait;
use axum::http::HeaderMap;
use tokenless_common::Role;

/// Authenticated caller as reported by the identity provider.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Per-app roles from the OIDC provider.
    pub roles: Vec<String>,
}

impl AuthUser {
    /// Check if the user has a specific role claim.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Role to assign when this caller signs in for the first time.
    pub fn initial_role(&self) -> Role {
        if self.has_role("admin") {
            Role::Admin
        } else if self.has_role("manager") {
            Role::Manager
        } else {
            Role::Student
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,
    #[error("Invalid Authorization header format")]
    InvalidFormat,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("JWKS fetch error: {0}")]
    JwksFetchError(String),
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),
}

/// Source of caller identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate a request from its headers.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    fn user_with_roles(roles: Vec<&str>) -> AuthUser {
        AuthUser {
            sub: "user123".to_string(),
            email: None,
            name: None,
            roles: roles.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn test_initial_role_prefers_highest_claim() {
        assert_eq!(user_with_roles(vec![]).initial_role(), Role::Student);
        assert_eq!(user_with_roles(vec!["manager"]).initial_role(), Role::Manager);
        assert_eq!(user_with_roles(vec!["manager", "admin"]).initial_role(), Role::Admin);
        assert_eq!(user_with_roles(vec!["Admin"]).initial_role(), Role::Student);
    }

    #[test]
    fn test_bearer_token_valid() {
        let headers = headers_with_auth("Bearer abc.def.ghi");
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_token_missing_header() {
        let err = bearer_token(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "Missing Authorization header");
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes() {
        let err = bearer_token(&headers_with_auth("Basic dXNlcjpwYXNz")).unwrap_err();
        assert!(matches!(err, AuthError::InvalidFormat));
        let err = bearer_token(&headers_with_auth("Bearer ")).unwrap_err();
        assert!(matches!(err, AuthError::InvalidFormat));
    }
}
