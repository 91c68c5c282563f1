//! User accounts: first sign-in registration and admin management.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokenless_common::{Role, User};

use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::store::{Store, UserUpdate};

/// Body for admin user creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Body for admin user updates.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_onboarded: Option<bool>,
}

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<Store>,
}

impl UserDirectory {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Find the caller's user record, registering it on first sign-in.
    ///
    /// New students start un-onboarded; staff roles granted by the identity
    /// provider are onboarded immediately.
    pub fn sign_in(&self, auth: &AuthUser) -> Result<User> {
        let now = Utc::now();
        let role = auth.initial_role();
        let email = auth.email.clone().unwrap_or_default();
        let template = User {
            uid: auth.sub.clone(),
            display_name: auth.name.clone().unwrap_or_else(|| email.clone()),
            email,
            role,
            is_onboarded: role.is_staff(),
            is_blocked: false,
            created_at: now,
            updated_at: now,
            approved_at: None,
        };

        let (user, _) = self.store.find_or_create_user(&template)?;
        Ok(user)
    }

    /// All users, or only those with `role`, newest first.
    pub fn list(&self, role: Option<Role>) -> Result<Vec<User>> {
        Ok(self.store.list_users(role)?)
    }

    pub fn get(&self, uid: &str) -> Result<User> {
        self.store
            .find_user(uid)?
            .ok_or_else(|| Error::NotFound("User".to_string()))
    }

    /// Create a user on behalf of an admin. Admin-created users skip onboarding.
    pub fn create(&self, input: &NewUser) -> Result<User> {
        let display_name = input.display_name.as_deref().map(str::trim).unwrap_or("");
        let email = input.email.as_deref().map(str::trim).unwrap_or("");
        if display_name.is_empty() || email.is_empty() {
            return Err(Error::InvalidInput(
                "Missing required fields: displayName, email".to_string(),
            ));
        }
        if self.store.find_user_by_email(email)?.is_some() {
            return Err(Error::Conflict("Email already exists".to_string()));
        }

        let now = Utc::now();
        let user = User {
            uid: User::generate_uid(),
            display_name: display_name.to_string(),
            email: email.to_string(),
            role: input.role.unwrap_or_default(),
            is_onboarded: true,
            is_blocked: false,
            created_at: now,
            updated_at: now,
            approved_at: Some(now),
        };
        self.store.insert_user(&user)?;

        tracing::info!(uid = %user.uid, role = %user.role, "User created by admin");
        Ok(user)
    }

    pub fn update(&self, uid: &str, patch: &UserPatch) -> Result<User> {
        if let Some(email) = patch.email.as_deref().map(str::trim) {
            if email.is_empty() {
                return Err(Error::InvalidInput("Email cannot be empty".to_string()));
            }
            if self
                .store
                .find_user_by_email(email)?
                .is_some_and(|other| other.uid != uid)
            {
                return Err(Error::Conflict("Email already exists".to_string()));
            }
        }

        let update = UserUpdate {
            display_name: patch.display_name.clone(),
            email: patch.email.as_deref().map(|e| e.trim().to_string()),
            role: patch.role,
            is_onboarded: patch.is_onboarded,
        };
        let user = self
            .store
            .update_user(uid, &update, Utc::now())?
            .ok_or_else(|| Error::NotFound("User".to_string()))?;

        tracing::info!(uid, "User updated");
        Ok(user)
    }

    pub fn delete(&self, uid: &str) -> Result<()> {
        if self.store.delete_user(uid)? == 0 {
            return Err(Error::NotFound("User".to_string()));
        }
        tracing::info!(uid, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::test_auth_user;

    fn directory() -> UserDirectory {
        UserDirectory::new(Arc::new(Store::open(":memory:").unwrap()))
    }

    #[test]
    fn test_first_sign_in_registers_pending_student() {
        let users = directory();
        let auth = test_auth_user("sub-1", Some("ada@example.com"), vec![]);

        let user = users.sign_in(&auth).unwrap();
        assert_eq!(user.role, Role::Student);
        assert!(!user.is_onboarded);
        assert_eq!(user.display_name, "ada@example.com");

        let again = users.sign_in(&auth).unwrap();
        assert_eq!(again.created_at, user.created_at);
    }

    #[test]
    fn test_staff_sign_in_is_onboarded() {
        let users = directory();
        let user = users
            .sign_in(&test_auth_user("sub-2", None, vec!["manager"]))
            .unwrap();
        assert_eq!(user.role, Role::Manager);
        assert!(user.is_onboarded);
    }

    #[test]
    fn test_create_requires_fields_and_unique_email() {
        let users = directory();
        assert!(matches!(users.create(&NewUser::default()), Err(Error::InvalidInput(_))));

        let input = NewUser {
            display_name: Some("Grace".to_string()),
            email: Some("grace@example.com".to_string()),
            role: Some(Role::Manager),
        };
        let created = users.create(&input).unwrap();
        assert!(created.uid.starts_with("user-"));
        assert!(created.is_onboarded);
        assert_eq!(users.get(&created.uid).unwrap().role, Role::Manager);

        assert!(matches!(users.create(&input), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_update_and_delete() {
        let users = directory();
        let user = users
            .sign_in(&test_auth_user("sub-1", Some("a@example.com"), vec![]))
            .unwrap();

        let patch = UserPatch {
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert_eq!(users.update(&user.uid, &patch).unwrap().role, Role::Admin);
        assert!(matches!(users.update("ghost", &patch), Err(Error::NotFound(_))));

        users.delete(&user.uid).unwrap();
        assert!(matches!(users.delete(&user.uid), Err(Error::NotFound(_))));
        assert!(matches!(users.get(&user.uid), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_update_rejects_taken_email() {
        let users = directory();
        let ada = users
            .sign_in(&test_auth_user("sub-1", Some("ada@example.com"), vec![]))
            .unwrap();
        users
            .sign_in(&test_auth_user("sub-2", Some("grace@example.com"), vec![]))
            .unwrap();

        let taken = UserPatch {
            email: Some("grace@example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(users.update(&ada.uid, &taken), Err(Error::Conflict(_))));
        assert_eq!(users.get(&ada.uid).unwrap().email, "ada@example.com");

        // Keeping one's own email is not a conflict.
        let same = UserPatch {
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        };
        assert!(users.update(&ada.uid, &same).is_ok());
    }

    #[test]
    fn test_list_by_role() {
        let users = directory();
        users.sign_in(&test_auth_user("s1", None, vec![])).unwrap();
        users.sign_in(&test_auth_user("m1", None, vec!["manager"])).unwrap();

        assert_eq!(users.list(None).unwrap().len(), 2);
        let students = users.list(Some(Role::Student)).unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].uid, "s1");
    }
}
