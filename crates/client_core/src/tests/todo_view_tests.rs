use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use super::*;
use crate::{
    backend::{ApiResult, HttpBackend},
    mock_backend::{spawn_mock_backend, MockState, VALID_TOKEN},
    mutation::{MutationKind, MutationState},
    session::{MemorySessionStorage, Session},
    validation::TITLE_REQUIRED,
};
use async_trait::async_trait;
use serde_json::json;
use shared::{error::ErrorCode, protocol::TaskPatch};
use tokio::sync::Notify;

fn signed_in_store() -> Arc<SessionStore> {
    SessionStore::load(Arc::new(MemorySessionStorage::with_session(Session::new(
        VALID_TOKEN,
        "user@example.com",
    ))))
}

fn signed_out_store() -> Arc<SessionStore> {
    SessionStore::load(Arc::new(MemorySessionStorage::new()))
}

async fn http_view(state: MockState) -> (crate::mock_backend::MockBackend, Arc<TodoView>) {
    let mock = spawn_mock_backend(state).await;
    let view = TodoView::new(
        Arc::new(HttpBackend::new(mock.url.clone())),
        signed_in_store(),
    );
    (mock, view)
}

async fn wait_until<F>(view: &TodoView, mut condition: F)
where
    F: FnMut(&TodoViewState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if condition(&view.snapshot().await) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// In-memory backend whose mutations block until the test opens the gate.
#[derive(Default)]
struct GatedTaskApi {
    tasks: std::sync::Mutex<Vec<Task>>,
    gate: Notify,
    list_calls: AtomicUsize,
    patches: std::sync::Mutex<Vec<(TaskId, TaskPatch)>>,
}

impl GatedTaskApi {
    fn with_task(id: &str, title: &str, completed: bool) -> Self {
        let api = Self::default();
        api.tasks.lock().expect("tasks").push(Task {
            id: TaskId::new(id),
            title: title.to_string(),
            completed,
        });
        api
    }
}

#[async_trait]
impl TaskApi for GatedTaskApi {
    async fn list(&self, _token: &str) -> ApiResult<Vec<Task>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tasks.lock().expect("tasks").clone())
    }

    async fn create(&self, _token: &str, title: &str) -> ApiResult<Task> {
        self.gate.notified().await;
        let mut tasks = self.tasks.lock().expect("tasks");
        let task = Task {
            id: TaskId::new(format!("g{}", tasks.len() + 1)),
            title: title.to_string(),
            completed: false,
        };
        tasks.push(task.clone());
        Ok(task)
    }

    async fn update(&self, _token: &str, id: &TaskId, patch: &TaskPatch) -> ApiResult<Task> {
        self.gate.notified().await;
        self.patches
            .lock()
            .expect("patches")
            .push((id.clone(), patch.clone()));
        let mut tasks = self.tasks.lock().expect("tasks");
        let task = tasks
            .iter_mut()
            .find(|task| &task.id == id)
            .ok_or_else(|| ApiError::not_found(TODO_NOT_FOUND))?;
        if let Some(title) = &patch.title {
            task.title = title.clone();
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        Ok(task.clone())
    }

    async fn delete(&self, _token: &str, id: &TaskId) -> ApiResult<()> {
        self.gate.notified().await;
        self.tasks.lock().expect("tasks").retain(|task| &task.id != id);
        Ok(())
    }
}

/// Backend whose creates wait on one gate and whose list waits on another
/// once `hold_lists` is set.
#[derive(Default)]
struct StagedTaskApi {
    creates: AtomicUsize,
    create_gate: Notify,
    list_calls: AtomicUsize,
    list_gate: Notify,
    hold_lists: AtomicBool,
}

#[async_trait]
impl TaskApi for StagedTaskApi {
    async fn list(&self, _token: &str) -> ApiResult<Vec<Task>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_lists.load(Ordering::SeqCst) {
            self.list_gate.notified().await;
        }
        Ok(Vec::new())
    }

    async fn create(&self, _token: &str, title: &str) -> ApiResult<Task> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.create_gate.notified().await;
        Ok(Task {
            id: TaskId::new(format!("s{n}")),
            title: title.to_string(),
            completed: false,
        })
    }

    async fn update(&self, _token: &str, _id: &TaskId, _patch: &TaskPatch) -> ApiResult<Task> {
        Err(ApiError::not_found(TODO_NOT_FOUND))
    }

    async fn delete(&self, _token: &str, _id: &TaskId) -> ApiResult<()> {
        Err(ApiError::not_found(TODO_NOT_FOUND))
    }
}

async fn wait_for_count(counter: &AtomicUsize, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while counter.load(Ordering::SeqCst) < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("count not reached in time");
}

#[tokio::test]
async fn mount_without_session_redirects_before_any_fetch() {
    let mock = spawn_mock_backend(MockState::default().with_task("t1", "Walk", false)).await;
    let view = TodoView::new(
        Arc::new(HttpBackend::new(mock.url.clone())),
        signed_out_store(),
    );

    assert_eq!(view.mount().await, AccessState::Unauthorized);

    let snapshot = view.snapshot().await;
    assert!(snapshot.visible_tasks().is_none());
    assert_eq!(
        snapshot.redirect.as_ref().map(|r| r.to),
        Some(Route::Login)
    );
    assert_eq!(mock.state.lock().await.list_calls, 0);
    assert_eq!(
        view.submit_add().await,
        MutationOutcome::Invalid({
            let mut errors = FieldErrors::new();
            errors.insert(Field::Title, TITLE_REQUIRED);
            errors
        })
    );
    view.set_new_task_title("sneaky").await;
    assert_eq!(view.submit_add().await, MutationOutcome::Discarded);
    assert_eq!(mock.state.lock().await.create_calls, 0);
}

#[tokio::test]
async fn mount_with_session_loads_tasks() {
    let (_mock, view) = http_view(MockState::default().with_task("t1", "Walk", false)).await;

    assert!(view.mount().await.is_authorized());

    let snapshot = view.snapshot().await;
    assert!(!snapshot.loading);
    assert_eq!(snapshot.visible_tasks().map(|t| t.len()), Some(1));
    assert!(snapshot.redirect.is_none());
}

#[tokio::test]
async fn add_clears_input_and_shows_refetched_task() {
    let (mock, view) = http_view(MockState::default()).await;
    view.mount().await;

    view.set_new_task_title("Buy milk").await;
    assert_eq!(view.submit_add().await, MutationOutcome::Applied);

    let snapshot = view.snapshot().await;
    assert_eq!(snapshot.new_task.draft().title, "");
    assert!(snapshot.tasks.iter().any(|task| task.title == "Buy milk"));
    assert_eq!(mock.state.lock().await.list_calls, 2);
    let key = MutationKey::new(MutationKind::Add, None);
    assert_eq!(snapshot.mutations.state(&key), MutationState::Idle);
}

#[tokio::test]
async fn double_add_while_pending_creates_exactly_one_task() {
    let (mock, view) = http_view(MockState {
        create_delay: Some(Duration::from_millis(150)),
        ..MockState::default()
    })
    .await;
    view.mount().await;
    view.set_new_task_title("Buy milk").await;

    let (first, second) = tokio::join!(view.submit_add(), view.submit_add());

    let mut outcomes = vec![first, second];
    outcomes.sort_by_key(|outcome| matches!(outcome, MutationOutcome::Rejected));
    assert_eq!(
        outcomes,
        vec![MutationOutcome::Applied, MutationOutcome::Rejected]
    );
    let state = mock.state.lock().await;
    assert_eq!(state.create_calls, 1);
    assert_eq!(state.tasks.len(), 1);
}

#[tokio::test]
async fn toggle_keeps_old_checkbox_until_refetch_confirms() {
    let api = Arc::new(GatedTaskApi::with_task("t1", "Walk", false));
    let view = TodoView::new(api.clone(), signed_in_store());
    view.mount().await;

    let pending = tokio::spawn({
        let view = view.clone();
        async move { view.toggle(&TaskId::new("t1")).await }
    });

    let key = MutationKey::new(MutationKind::Toggle, Some(TaskId::new("t1")));
    wait_until(&view, |state| state.mutations.is_pending(&key)).await;
    let snapshot = view.snapshot().await;
    assert!(!snapshot.tasks[0].completed);

    api.gate.notify_one();
    assert_eq!(pending.await.expect("join"), MutationOutcome::Applied);

    assert!(view.snapshot().await.tasks[0].completed);
    assert_eq!(
        api.patches.lock().expect("patches").clone(),
        vec![(TaskId::new("t1"), TaskPatch::completed(true))]
    );
}

#[tokio::test]
async fn toggle_sends_completed_only_body_over_http() {
    let (mock, view) = http_view(MockState::default().with_task("t1", "Walk", false)).await;
    view.mount().await;

    assert_eq!(
        view.toggle(&TaskId::new("t1")).await,
        MutationOutcome::Applied
    );
    assert_eq!(
        mock.state.lock().await.patch_bodies,
        vec![(TaskId::new("t1"), json!({ "completed": true }))]
    );
    assert!(view.snapshot().await.tasks[0].completed);
}

#[tokio::test]
async fn deleting_stale_id_surfaces_not_found_and_keeps_list() {
    let (mock, view) = http_view(MockState::default().with_task("t1", "Walk", false)).await;
    view.mount().await;

    let outcome = view.delete(&TaskId::new("gone")).await;
    match outcome {
        MutationOutcome::Failed(err) => assert_eq!(err.code, ErrorCode::NotFound),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let snapshot = view.snapshot().await;
    assert_eq!(snapshot.error.as_deref(), Some("Todo not found"));
    assert_eq!(snapshot.tasks.len(), 1);
    assert_eq!(mock.state.lock().await.list_calls, 1);

    view.dismiss_error().await;
    assert!(view.snapshot().await.error.is_none());
}

#[tokio::test]
async fn failed_add_keeps_draft_for_retry() {
    let (_mock, view) = http_view(MockState {
        reject_create_with: Some(json!({ "message": "Title too long" })),
        ..MockState::default()
    })
    .await;
    view.mount().await;
    view.set_new_task_title("A very long title").await;

    assert!(matches!(
        view.submit_add().await,
        MutationOutcome::Failed(_)
    ));
    let snapshot = view.snapshot().await;
    assert_eq!(snapshot.new_task.draft().title, "A very long title");
    assert_eq!(snapshot.error.as_deref(), Some("Title too long"));
    assert!(!snapshot
        .mutations
        .is_pending(&MutationKey::new(MutationKind::Add, None)));
}

#[tokio::test]
async fn edit_flow_updates_title_and_leaves_edit_mode() {
    let (mock, view) = http_view(MockState::default().with_task("t1", "Walk", false)).await;
    view.mount().await;

    assert!(view.begin_edit(&TaskId::new("t1")).await);
    assert_eq!(
        view.snapshot()
            .await
            .editing
            .as_ref()
            .map(|edit| edit.form.draft().title.clone()),
        Some("Walk".to_string())
    );

    view.set_edit_value("   ").await;
    assert!(matches!(
        view.submit_edit().await,
        MutationOutcome::Invalid(_)
    ));
    assert!(mock.state.lock().await.patch_bodies.is_empty());

    view.set_edit_value("Walk the dog").await;
    assert_eq!(view.submit_edit().await, MutationOutcome::Applied);

    let snapshot = view.snapshot().await;
    assert!(snapshot.editing.is_none());
    assert_eq!(snapshot.tasks[0].title, "Walk the dog");
    assert_eq!(
        mock.state.lock().await.patch_bodies,
        vec![(TaskId::new("t1"), json!({ "title": "Walk the dog" }))]
    );
}

#[tokio::test]
async fn cancel_edit_and_edit_without_target() {
    let (_mock, view) = http_view(MockState::default().with_task("t1", "Walk", false)).await;
    view.mount().await;

    assert!(!view.begin_edit(&TaskId::new("nope")).await);
    assert_eq!(view.submit_edit().await, MutationOutcome::Rejected);

    assert!(view.begin_edit(&TaskId::new("t1")).await);
    view.cancel_edit().await;
    assert!(view.snapshot().await.editing.is_none());
}

#[tokio::test]
async fn unauthorized_fetch_expires_session() {
    let storage = Arc::new(MemorySessionStorage::with_session(Session::new(
        VALID_TOKEN,
        "user@example.com",
    )));
    let session = SessionStore::load(storage.clone());
    let mock = spawn_mock_backend(MockState::default()).await;
    let view = TodoView::new(Arc::new(HttpBackend::new(mock.url.clone())), session.clone());
    view.mount().await;

    mock.state.lock().await.list_status = Some(axum::http::StatusCode::UNAUTHORIZED);
    let err = view.refetch().await.expect_err("must fail");
    assert_eq!(err.code, ErrorCode::Unauthorized);

    let snapshot = view.snapshot().await;
    assert_eq!(snapshot.access, AccessState::Unauthorized);
    assert_eq!(snapshot.error.as_deref(), Some(SESSION_EXPIRED));
    assert_eq!(
        view.take_redirect().await.map(|r| r.to),
        Some(Route::Login)
    );
    assert!(!session.is_authenticated());
    assert_eq!(storage.stored(), None);
}

#[tokio::test]
async fn late_result_after_unmount_is_ignored() {
    let api = Arc::new(GatedTaskApi::default());
    let view = TodoView::new(api.clone(), signed_in_store());
    view.mount().await;
    view.set_new_task_title("Late").await;

    let pending = tokio::spawn({
        let view = view.clone();
        async move { view.submit_add().await }
    });
    let key = MutationKey::new(MutationKind::Add, None);
    wait_until(&view, |state| state.mutations.is_pending(&key)).await;

    view.unmount().await;
    let list_calls_before = api.list_calls.load(Ordering::SeqCst);
    api.gate.notify_one();

    assert_eq!(pending.await.expect("join"), MutationOutcome::Discarded);
    assert_eq!(api.list_calls.load(Ordering::SeqCst), list_calls_before);
    let snapshot = view.snapshot().await;
    assert!(!snapshot.mounted);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn external_logout_is_observed_by_mounted_view() {
    let session = signed_in_store();
    let view = TodoView::new(Arc::new(GatedTaskApi::default()), session.clone());
    view.mount().await;
    let watcher = view.watch_session();

    session.clear().expect("clear");
    wait_until(&view, |state| state.access == AccessState::Unauthorized).await;
    assert_eq!(
        view.take_redirect().await.map(|r| r.to),
        Some(Route::Login)
    );

    watcher.abort();
}

#[tokio::test]
async fn add_stays_pending_until_its_refetch_lands() {
    let api = Arc::new(StagedTaskApi::default());
    let view = TodoView::new(api.clone(), signed_in_store());
    view.mount().await;
    api.hold_lists.store(true, Ordering::SeqCst);
    let key = MutationKey::new(MutationKind::Add, None);

    view.set_new_task_title("First").await;
    let first = tokio::spawn({
        let view = view.clone();
        async move { view.submit_add().await }
    });
    wait_for_count(&api.creates, 1).await;
    api.create_gate.notify_one();
    // The create has returned; the follow-up list is now parked.
    wait_for_count(&api.list_calls, 2).await;
    assert!(view.snapshot().await.mutations.is_pending(&key));

    view.set_new_task_title("Second").await;
    assert_eq!(view.submit_add().await, MutationOutcome::Rejected);
    assert_eq!(api.creates.load(Ordering::SeqCst), 1);
    assert_eq!(view.snapshot().await.new_task.draft().title, "Second");

    api.hold_lists.store(false, Ordering::SeqCst);
    api.list_gate.notify_one();
    assert_eq!(first.await.expect("join"), MutationOutcome::Applied);
    assert_eq!(view.snapshot().await.mutations.state(&key), MutationState::Idle);

    let second = tokio::spawn({
        let view = view.clone();
        async move { view.submit_add().await }
    });
    wait_for_count(&api.creates, 2).await;
    assert!(view.snapshot().await.mutations.is_pending(&key));
    assert_eq!(view.submit_add().await, MutationOutcome::Rejected);
    assert_eq!(api.creates.load(Ordering::SeqCst), 2);

    api.create_gate.notify_one();
    assert_eq!(second.await.expect("join"), MutationOutcome::Applied);
}

#[tokio::test]
async fn unauthorized_mutation_expires_session() {
    let storage = Arc::new(MemorySessionStorage::with_session(Session::new(
        VALID_TOKEN,
        "user@example.com",
    )));
    let session = SessionStore::load(storage.clone());
    let mock = spawn_mock_backend(MockState::default().with_task("t1", "Walk", false)).await;
    let view = TodoView::new(Arc::new(HttpBackend::new(mock.url.clone())), session.clone());
    view.mount().await;

    mock.state.lock().await.revoked = true;
    assert_eq!(
        view.delete(&TaskId::new("t1")).await,
        MutationOutcome::SessionExpired
    );

    assert!(!session.is_authenticated());
    assert_eq!(storage.stored(), None);
    let snapshot = view.snapshot().await;
    assert_eq!(snapshot.access, AccessState::Unauthorized);
    assert_eq!(snapshot.error.as_deref(), Some(SESSION_EXPIRED));
    assert!(snapshot.visible_tasks().is_none());
    assert_eq!(
        view.take_redirect().await.map(|r| r.to),
        Some(Route::Login)
    );
    assert_eq!(mock.state.lock().await.tasks.len(), 1);
}
