//! The to-do list view: access guard, cached task list, input buffers, the
//! error banner, and the coordinator that runs every mutation.
//!
//! Local task state only changes through a refetch. A toggled checkbox keeps
//! showing its old value until the backend confirms the change.

use std::sync::{Arc, Weak};

use shared::{
    domain::{Route, Task, TaskId},
    error::ApiError,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    backend::{ApiResult, TaskApi},
    mutation::{MutationKey, MutationTracker, PendingMutation},
    navigation::Redirect,
    session::{AccessState, SessionStore},
    validation::{Field, FieldErrors, Form, TitleDraft},
};

pub const SESSION_EXPIRED: &str = "Session expired, please log in again";
pub const TODO_NOT_FOUND: &str = "Todo not found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Confirmed by the backend; the list has been refetched.
    Applied,
    /// Not submitted: the same mutation is still pending, or there was
    /// nothing to submit.
    Rejected,
    /// Local validation failed; nothing was sent.
    Invalid(FieldErrors),
    /// The backend or transport failed; the message is in the banner.
    Failed(ApiError),
    /// The token was refused; the session has been cleared.
    SessionExpired,
    /// The view was not mounted (or was unmounted mid-flight).
    Discarded,
}

#[derive(Debug, Clone)]
pub struct EditDraft {
    pub id: TaskId,
    pub form: Form<TitleDraft>,
}

#[derive(Debug, Clone)]
pub struct TodoViewState {
    pub access: AccessState,
    pub mounted: bool,
    pub loading: bool,
    pub tasks: Vec<Task>,
    pub new_task: Form<TitleDraft>,
    pub editing: Option<EditDraft>,
    pub error: Option<String>,
    pub mutations: MutationTracker,
    pub redirect: Option<Redirect>,
    generation: u64,
}

impl Default for TodoViewState {
    fn default() -> Self {
        Self {
            access: AccessState::Unchecked,
            mounted: false,
            loading: false,
            tasks: Vec::new(),
            new_task: Form::new(),
            editing: None,
            error: None,
            mutations: MutationTracker::new(),
            redirect: None,
            generation: 0,
        }
    }
}

impl TodoViewState {
    /// Tasks, but only once the access guard has authorized this view.
    pub fn visible_tasks(&self) -> Option<&[Task]> {
        self.access.is_authorized().then_some(self.tasks.as_slice())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.mounted && self.generation == generation
    }

    fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }
}

pub struct TodoView {
    api: Arc<dyn TaskApi>,
    session: Arc<SessionStore>,
    state: Mutex<TodoViewState>,
}

impl TodoView {
    pub fn new(api: Arc<dyn TaskApi>, session: Arc<SessionStore>) -> Arc<Self> {
        Arc::new(Self {
            api,
            session,
            state: Mutex::new(TodoViewState::default()),
        })
    }

    pub async fn snapshot(&self) -> TodoViewState {
        self.state.lock().await.clone()
    }

    pub async fn take_redirect(&self) -> Option<Redirect> {
        self.state.lock().await.redirect.take()
    }

    /// Runs the access guard and, if authorized, the first fetch. Nothing
    /// protected is visible until the guard has passed.
    pub async fn mount(&self) -> AccessState {
        let access = {
            let mut state = self.state.lock().await;
            let access = AccessState::evaluate(&self.session);
            state.access = access.clone();
            state.generation += 1;
            if access.is_authorized() {
                state.mounted = true;
                state.loading = true;
                state.redirect = None;
            } else {
                info!("no session; redirecting to login");
                state.mounted = false;
                state.redirect = Some(Redirect::immediate(Route::Login));
            }
            access
        };

        if access.is_authorized() {
            if let Err(err) = self.refetch().await {
                debug!(error = %err, "initial fetch failed");
            }
        }
        access
    }

    /// Leaves the view. Results that arrive afterwards are dropped.
    pub async fn unmount(&self) {
        let mut state = self.state.lock().await;
        state.mounted = false;
        state.generation += 1;
        state.loading = false;
        state.mutations.clear();
        state.editing = None;
        state.new_task.reset();
    }

    /// Follows session changes published by the store until the view is
    /// dropped.
    pub fn watch_session(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.session.subscribe();
        let view: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(view) = view.upgrade() else {
                    break;
                };
                view.on_session_changed().await;
            }
        })
    }

    pub async fn on_session_changed(&self) {
        let mut state = self.state.lock().await;
        if !state.mounted {
            return;
        }
        let access = AccessState::evaluate(&self.session);
        if !access.is_authorized() {
            info!("session ended elsewhere; leaving to-do view");
            Self::leave_for_login(&mut state, None);
        } else {
            state.access = access;
        }
    }

    pub async fn refetch(&self) -> Result<(), ApiError> {
        let (token, generation) = {
            let mut state = self.state.lock().await;
            let Some(token) = state.access.token().map(str::to_string) else {
                return Ok(());
            };
            if !state.mounted {
                return Ok(());
            }
            state.loading = true;
            (token, state.generation)
        };

        let result = self.api.list(&token).await;

        let mut state = self.state.lock().await;
        if !state.is_current(generation) {
            debug!("dropping task list that arrived after unmount");
            return Ok(());
        }
        state.loading = false;
        match result {
            Ok(tasks) => {
                debug!(count = tasks.len(), "task list refreshed");
                state.tasks = tasks;
                Ok(())
            }
            Err(err) => {
                self.surface_failure(&mut state, &err);
                Err(err)
            }
        }
    }

    pub async fn set_new_task_title(&self, title: impl Into<String>) {
        self.state
            .lock()
            .await
            .new_task
            .set_field(Field::Title, title);
    }

    pub async fn submit_add(&self) -> MutationOutcome {
        let title = {
            let mut state = self.state.lock().await;
            match state.new_task.submit() {
                Ok(draft) => draft.title,
                Err(errors) => return MutationOutcome::Invalid(errors),
            }
        };
        self.run(PendingMutation::Add { title }).await
    }

    /// Enters edit mode for a cached task, seeding the buffer with its
    /// current title. Returns `false` for unknown ids.
    pub async fn begin_edit(&self, id: &TaskId) -> bool {
        let mut state = self.state.lock().await;
        let Some(title) = state.task(id).map(|task| task.title.clone()) else {
            return false;
        };
        state.editing = Some(EditDraft {
            id: id.clone(),
            form: Form::with_draft(TitleDraft::new(title)),
        });
        true
    }

    pub async fn set_edit_value(&self, title: impl Into<String>) -> bool {
        let mut state = self.state.lock().await;
        match state.editing.as_mut() {
            Some(edit) => edit.form.set_field(Field::Title, title),
            None => false,
        }
    }

    pub async fn cancel_edit(&self) {
        self.state.lock().await.editing = None;
    }

    pub async fn submit_edit(&self) -> MutationOutcome {
        let mutation = {
            let mut state = self.state.lock().await;
            let Some(edit) = state.editing.as_mut() else {
                return MutationOutcome::Rejected;
            };
            match edit.form.submit() {
                Ok(draft) => PendingMutation::Edit {
                    id: edit.id.clone(),
                    title: draft.title,
                },
                Err(errors) => return MutationOutcome::Invalid(errors),
            }
        };
        self.run(mutation).await
    }

    pub async fn delete(&self, id: &TaskId) -> MutationOutcome {
        self.run(PendingMutation::Delete { id: id.clone() }).await
    }

    /// Requests the opposite of the cached `completed` flag. The cached task
    /// itself is left alone until the refetch.
    pub async fn toggle(&self, id: &TaskId) -> MutationOutcome {
        let completed = {
            let mut state = self.state.lock().await;
            match state.task(id).map(|task| !task.completed) {
                Some(completed) => completed,
                None => {
                    let err = ApiError::not_found(TODO_NOT_FOUND);
                    state.error = Some(err.message.clone());
                    return MutationOutcome::Failed(err);
                }
            }
        };
        self.run(PendingMutation::Toggle {
            id: id.clone(),
            completed,
        })
        .await
    }

    pub async fn dismiss_error(&self) {
        self.state.lock().await.error = None;
    }

    async fn run(&self, mutation: PendingMutation) -> MutationOutcome {
        let key = mutation.key();
        let (token, generation) = {
            let mut state = self.state.lock().await;
            if !state.mounted {
                return MutationOutcome::Discarded;
            }
            let Some(token) = state.access.token().map(str::to_string) else {
                return MutationOutcome::Discarded;
            };
            if !state.mutations.begin(&mutation) {
                debug!(kind = ?key.kind, target = ?key.target, "mutation already pending");
                return MutationOutcome::Rejected;
            }
            (token, state.generation)
        };

        info!(kind = ?key.kind, target = ?key.target, "mutation started");
        let result = mutation.execute(self.api.as_ref(), &token).await;

        {
            let mut state = self.state.lock().await;
            if !state.is_current(generation) {
                debug!(kind = ?key.kind, "dropping mutation result that arrived after unmount");
                return MutationOutcome::Discarded;
            }
            if let Err(err) = &result {
                warn!(kind = ?key.kind, error = %err, "mutation failed");
                state.mutations.finish(&key, &result);
                state.mutations.settle(&key);
                self.surface_failure(&mut state, err);
                return if err.is_unauthorized() {
                    MutationOutcome::SessionExpired
                } else {
                    MutationOutcome::Failed(err.clone())
                };
            }
            state.error = None;
            Self::reset_drafts_after_success(&mut state, &mutation);
        }

        // The key stays pending until the refetch has been applied.
        match self.refetch().await {
            Err(err) if err.is_unauthorized() => return MutationOutcome::SessionExpired,
            Err(err) => debug!(error = %err, "refetch after mutation failed"),
            Ok(()) => {}
        }
        self.settle(&key, &result, generation).await;
        MutationOutcome::Applied
    }

    async fn settle(&self, key: &MutationKey, result: &ApiResult<()>, generation: u64) {
        let mut state = self.state.lock().await;
        if state.is_current(generation) {
            state.mutations.finish(key, result);
            state.mutations.settle(key);
        }
    }

    fn reset_drafts_after_success(state: &mut TodoViewState, mutation: &PendingMutation) {
        match mutation {
            PendingMutation::Add { .. } => state.new_task.reset(),
            PendingMutation::Edit { id, .. } | PendingMutation::Delete { id } => {
                if state.editing.as_ref().is_some_and(|edit| &edit.id == id) {
                    state.editing = None;
                }
            }
            PendingMutation::Toggle { .. } => {}
        }
    }

    fn surface_failure(&self, state: &mut TodoViewState, err: &ApiError) {
        if err.is_unauthorized() {
            if let Err(clear_err) = self.session.clear() {
                warn!(error = %clear_err, "failed to erase persisted session");
            }
            Self::leave_for_login(state, Some(SESSION_EXPIRED));
        } else {
            state.error = Some(err.message.clone());
        }
    }

    fn leave_for_login(state: &mut TodoViewState, message: Option<&str>) {
        state.access = AccessState::Unauthorized;
        state.mounted = false;
        state.generation += 1;
        state.loading = false;
        state.tasks.clear();
        state.editing = None;
        state.mutations.clear();
        state.error = message.map(str::to_string);
        state.redirect = Some(match message {
            Some(message) => Redirect::with_notice(Route::Login, Default::default(), message),
            None => Redirect::immediate(Route::Login),
        });
    }
}

#[cfg(test)]
#[path = "tests/todo_view_tests.rs"]
mod tests;
