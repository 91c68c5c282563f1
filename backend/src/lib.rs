pub mod config;
pub mod routes;
pub mod auth;
pub mod store;
pub mod meals;
pub mod onboarding;
pub mod users;
pub mod events;
pub mod error;
pub mod logging;
pub mod test_util;

pub use config::Config;
pub use auth::{AuthUser, IdentityProvider, JwksClient};
pub use store::Store;
pub use error::Error;
pub use events::{EventBus, MealEvent};
pub use meals::{AdmissionController, IdentityGate, LifecycleManager};
pub use onboarding::OnboardingGate;
pub use users::UserDirectory;

use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Source of caller identity (OIDC in production).
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<Store>,
    pub users: UserDirectory,
    pub admission: AdmissionController,
    pub lifecycle: LifecycleManager,
    pub onboarding: OnboardingGate,
    /// Broadcast channel for meal events (for manager dashboards).
    pub events: EventBus,
}

impl AppState {
    /// Wire the services around one shared store and event channel.
    pub fn new(config: Config, identity: Arc<dyn IdentityProvider>, store: Arc<Store>) -> Self {
        let events = EventBus::new(config.events.capacity);
        Self {
            users: UserDirectory::new(store.clone()),
            admission: AdmissionController::new(store.clone(), events.clone()),
            lifecycle: LifecycleManager::new(
                store.clone(),
                events.clone(),
                config.lifecycle.allow_reopen,
            ),
            onboarding: OnboardingGate::new(store.clone(), events.clone()),
            config,
            identity,
            store,
            events,
        }
    }
}
