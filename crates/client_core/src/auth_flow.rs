//! Login, signup and logout.
//!
//! Both forms validate locally, refuse a second submit while a request is
//! outstanding, and keep the draft on failure.

use std::{sync::Arc, time::Duration};

use shared::{domain::Route, protocol::Credentials};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    backend::AuthApi,
    navigation::Redirect,
    session::SessionStore,
    validation::{Draft, Field, FieldErrors, Form, LoginDraft, SignupDraft},
};

pub const LOGIN_SUCCEEDED: &str = "Login successful!";
pub const SIGNUP_SUCCEEDED: &str = "Account created! Please log in.";
pub const LOGGED_OUT: &str = "Logged out!";
pub const SESSION_NOT_SAVED: &str = "Login succeeded but the session could not be saved";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Redirect(Redirect),
    Invalid(FieldErrors),
    Failed(String),
    /// A request from an earlier submit is still outstanding.
    Busy,
}

#[derive(Debug, Clone, Default)]
pub struct AuthFormState<D: Draft> {
    pub form: Form<D>,
    pub busy: bool,
    pub error: Option<String>,
}

/// Shared submit bookkeeping for the two credential forms.
struct AuthForm<D: Draft> {
    state: Mutex<AuthFormState<D>>,
}

impl<D: Draft> AuthForm<D> {
    fn new() -> Self {
        Self {
            state: Mutex::new(AuthFormState::default()),
        }
    }

    async fn set_field(&self, field: Field, value: String) -> bool {
        self.state.lock().await.form.set_field(field, value)
    }

    async fn snapshot(&self) -> AuthFormState<D> {
        self.state.lock().await.clone()
    }

    /// Validates and marks the form busy. `Err` carries the outcome to
    /// return without contacting the backend.
    async fn begin(&self) -> Result<D, AuthOutcome> {
        let mut state = self.state.lock().await;
        if state.busy {
            return Err(AuthOutcome::Busy);
        }
        let draft = state.form.submit().map_err(AuthOutcome::Invalid)?;
        state.busy = true;
        state.error = None;
        Ok(draft)
    }

    async fn fail(&self, message: String) -> AuthOutcome {
        let mut state = self.state.lock().await;
        state.busy = false;
        state.error = Some(message.clone());
        AuthOutcome::Failed(message)
    }

    async fn succeed(&self, redirect: Redirect) -> AuthOutcome {
        let mut state = self.state.lock().await;
        state.busy = false;
        state.form.reset();
        AuthOutcome::Redirect(redirect)
    }
}

pub struct LoginFlow {
    api: Arc<dyn AuthApi>,
    session: Arc<SessionStore>,
    confirmation_delay: Duration,
    form: AuthForm<LoginDraft>,
}

impl LoginFlow {
    pub fn new(
        api: Arc<dyn AuthApi>,
        session: Arc<SessionStore>,
        confirmation_delay: Duration,
    ) -> Self {
        Self {
            api,
            session,
            confirmation_delay,
            form: AuthForm::new(),
        }
    }

    pub async fn set_field(&self, field: Field, value: impl Into<String>) -> bool {
        self.form.set_field(field, value.into()).await
    }

    pub async fn snapshot(&self) -> AuthFormState<LoginDraft> {
        self.form.snapshot().await
    }

    /// On success the session is established and the caller is sent to the
    /// task view after the confirmation delay.
    pub async fn submit(&self) -> AuthOutcome {
        let draft = match self.form.begin().await {
            Ok(draft) => draft,
            Err(outcome) => return outcome,
        };
        let credentials = Credentials {
            email: draft.email,
            password: draft.password,
        };

        let response = match self.api.sign_in(&credentials).await {
            Ok(response) => response,
            Err(err) => {
                warn!(email = %credentials.email, error = %err, "login failed");
                return self.form.fail(err.message).await;
            }
        };

        if let Err(err) = self
            .session
            .establish(response.access_token, response.email)
        {
            warn!(error = %err, "failed to persist session");
            return self.form.fail(SESSION_NOT_SAVED.to_string()).await;
        }
        info!(email = %credentials.email, "logged in");
        self.form
            .succeed(Redirect::with_notice(
                Route::Todos,
                self.confirmation_delay,
                LOGIN_SUCCEEDED,
            ))
            .await
    }
}

pub struct SignupFlow {
    api: Arc<dyn AuthApi>,
    confirmation_delay: Duration,
    form: AuthForm<SignupDraft>,
}

impl SignupFlow {
    pub fn new(api: Arc<dyn AuthApi>, confirmation_delay: Duration) -> Self {
        Self {
            api,
            confirmation_delay,
            form: AuthForm::new(),
        }
    }

    pub async fn set_field(&self, field: Field, value: impl Into<String>) -> bool {
        self.form.set_field(field, value.into()).await
    }

    pub async fn snapshot(&self) -> AuthFormState<SignupDraft> {
        self.form.snapshot().await
    }

    /// Creates the account and sends the caller to the login view. No
    /// session is established.
    pub async fn submit(&self) -> AuthOutcome {
        let draft = match self.form.begin().await {
            Ok(draft) => draft,
            Err(outcome) => return outcome,
        };
        let credentials = Credentials {
            email: draft.email,
            password: draft.password,
        };

        match self.api.sign_up(&credentials).await {
            Ok(account) => {
                info!(email = %credentials.email, account = %account.0, "account created");
                self.form
                    .succeed(Redirect::with_notice(
                        Route::Login,
                        self.confirmation_delay,
                        SIGNUP_SUCCEEDED,
                    ))
                    .await
            }
            Err(err) => {
                warn!(email = %credentials.email, error = %err, "signup failed");
                self.form.fail(err.message).await
            }
        }
    }
}

/// Ends the session and sends the caller to the login view. Calling it
/// without a session is harmless.
pub fn logout(session: &SessionStore, confirmation_delay: Duration) -> Redirect {
    if let Err(err) = session.clear() {
        warn!(error = %err, "failed to erase persisted session");
    }
    Redirect::with_notice(Route::Login, confirmation_delay, LOGGED_OUT)
}

#[cfg(test)]
#[path = "tests/auth_flow_tests.rs"]
mod tests;
