//! Fixtures shared by unit and integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Local, TimeZone, Utc};
use tokenless_common::{MealRequest, MealType, RequestStatus, Role, User};

use crate::auth::{bearer_token, AuthError, AuthUser, IdentityProvider};
use crate::config::{
    Config, CorsConfig, DatabaseConfig, EventsConfig, LifecycleConfig, LoggingConfig, OidcConfig,
};
use crate::meals::token::day_bucket;
use crate::store::Store;
use crate::AppState;

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 8080,
        oidc: OidcConfig {
            issuer: "https://test-issuer".to_string(),
            audience: "test-audience".to_string(),
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        cors: CorsConfig {
            origins: "*".to_string(),
        },
        lifecycle: LifecycleConfig::default(),
        events: EventsConfig { capacity: 16 },
    }
}

pub fn test_auth_user(sub: &str, email: Option<&str>, roles: Vec<&str>) -> AuthUser {
    AuthUser {
        sub: sub.to_string(),
        email: email.map(String::from),
        name: None,
        roles: roles.iter().map(|s| s.to_string()).collect(),
    }
}

/// Identity provider that maps fixed bearer tokens to callers.
#[derive(Default)]
pub struct StaticIdentity {
    users: HashMap<String, AuthUser>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: &str, user: AuthUser) -> Self {
        self.users.insert(token.to_string(), user);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers)?;
        self.users
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken("unknown test token".to_string()))
    }
}

/// State backed by an in-memory store and the given identity provider.
pub fn test_state(identity: StaticIdentity) -> Arc<AppState> {
    let config = test_config();
    let store = Arc::new(Store::open(&config.database.url).expect("open in-memory store"));
    Arc::new(AppState::new(config, Arc::new(identity), store))
}

/// Insert a student directly into the store.
pub fn insert_student(store: &Store, uid: &str, onboarded: bool) -> User {
    let now = Utc::now();
    let user = User {
        uid: uid.to_string(),
        display_name: format!("Student {uid}"),
        email: format!("{uid}@example.com"),
        role: Role::Student,
        is_onboarded: onboarded,
        is_blocked: false,
        created_at: now,
        updated_at: now,
        approved_at: onboarded.then_some(now),
    };
    store.insert_user(&user).expect("insert student");
    store
        .find_user(uid)
        .expect("read student")
        .expect("student exists")
}

/// Insert a pending request bucketed on today's date.
pub fn insert_request(
    store: &Store,
    id: &str,
    student_id: &str,
    meal_type: MealType,
    blocked: bool,
) -> MealRequest {
    let now = Utc::now();
    let request = MealRequest {
        id: id.to_string(),
        student_id: student_id.to_string(),
        student_name: format!("Student {student_id}"),
        student_email: format!("{student_id}@example.com"),
        meal_type,
        token_id: format!("{}-TEST-{id}", meal_type.prefix()),
        status: RequestStatus::Pending,
        is_blocked: blocked,
        requested_at: now,
        updated_at: now,
    };
    store
        .insert_request(&request, &day_bucket(Local::now().date_naive()))
        .expect("insert request");
    store
        .find_request(id)
        .expect("read request")
        .expect("request exists")
}

/// A local wall-clock instant.
pub fn local_at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("unambiguous local time")
}
