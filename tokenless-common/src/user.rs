//! User and onboarding types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Access role of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    /// Managers and admins.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            _ => Err(ParseError::new("role", s)),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable subject id from the identity provider.
    pub uid: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    /// Students cannot submit requests until a manager approves them.
    pub is_onboarded: bool,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl User {
    /// Subject id for a user created by an admin rather than by sign-in.
    pub fn generate_uid() -> String {
        format!("user-{}", uuid::Uuid::new_v4().simple())
    }
}

/// Students waiting for onboarding approval, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOnboarding {
    pub total: usize,
    pub students: Vec<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_default_is_student() {
        assert_eq!(Role::default(), Role::Student);
    }

    #[test]
    fn test_role_is_staff() {
        assert!(!Role::Student.is_staff());
        assert!(Role::Manager.is_staff());
        assert!(Role::Admin.is_staff());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_generated_uid_format() {
        let uid = User::generate_uid();
        assert!(uid.starts_with("user-"));
        assert_eq!(uid.len(), "user-".len() + 32);
        assert_ne!(uid, User::generate_uid());
    }

    #[test]
    fn test_user_skips_missing_approved_at() {
        let now = Utc::now();
        let user = User {
            uid: "u1".to_string(),
            display_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::Student,
            is_onboarded: false,
            is_blocked: false,
            created_at: now,
            updated_at: now,
            approved_at: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["displayName"], "Ada");
        assert_eq!(json["isOnboarded"], false);
        assert!(json.get("approvedAt").is_none());
    }
}
