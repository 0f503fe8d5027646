use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tracing::info;

pub mod auth_flow;
pub mod backend;
pub mod mutation;
pub mod navigation;
pub mod session;
pub mod settings;
pub mod todo_view;
pub mod validation;

pub use auth_flow::{logout, AuthFormState, AuthOutcome, LoginFlow, SignupFlow};
pub use backend::{ApiResult, AuthApi, HttpBackend, TaskApi};
pub use mutation::{MutationKind, MutationState, MutationTracker, PendingMutation};
pub use navigation::Redirect;
pub use session::{
    AccessState, FileSessionStorage, MemorySessionStorage, Session, SessionPersistence,
    SessionStore,
};
pub use settings::{load_settings, ClientSettings};
pub use todo_view::{MutationOutcome, TodoView, TodoViewState};
pub use validation::{Field, FieldErrors, Form};

/// One client instance: the backend, the single session store, and the
/// confirmation delays the flows share.
pub struct ClientContext {
    backend: Arc<HttpBackend>,
    session: Arc<SessionStore>,
    redirect_delay: Duration,
    logout_delay: Duration,
}

impl ClientContext {
    pub fn new(
        backend: Arc<HttpBackend>,
        session: Arc<SessionStore>,
        redirect_delay: Duration,
        logout_delay: Duration,
    ) -> Self {
        Self {
            backend,
            session,
            redirect_delay,
            logout_delay,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let api_url = settings.api_url()?;
        info!(api = %api_url, session_file = %settings.session_file.display(), "client starting");
        let persistence = Arc::new(FileSessionStorage::new(settings.session_file.clone()));
        Ok(Self::new(
            Arc::new(HttpBackend::new(api_url)),
            SessionStore::load(persistence),
            settings.redirect_delay(),
            settings.logout_delay(),
        ))
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn login_flow(&self) -> LoginFlow {
        LoginFlow::new(
            self.backend.clone(),
            self.session.clone(),
            self.redirect_delay,
        )
    }

    pub fn signup_flow(&self) -> SignupFlow {
        SignupFlow::new(self.backend.clone(), self.redirect_delay)
    }

    pub fn todo_view(&self) -> Arc<TodoView> {
        TodoView::new(self.backend.clone(), self.session.clone())
    }

    pub fn logout(&self) -> Redirect {
        logout(&self.session, self.logout_delay)
    }
}

#[cfg(test)]
#[path = "tests/mock_backend.rs"]
mod mock_backend;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
