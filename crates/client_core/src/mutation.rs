//! Per-mutation state machine: `Idle -> Pending -> (Succeeded | Failed) -> Idle`.
//!
//! Mutations are keyed by kind and target task, so a second "add" (or a
//! second toggle of the same task) is refused while the first is pending,
//! but unrelated mutations may overlap.

use std::collections::HashMap;

use shared::{domain::TaskId, error::ApiError, protocol::TaskPatch};

use crate::backend::{ApiResult, TaskApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Add,
    Edit,
    Delete,
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMutation {
    Add { title: String },
    Edit { id: TaskId, title: String },
    Delete { id: TaskId },
    Toggle { id: TaskId, completed: bool },
}

impl PendingMutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            PendingMutation::Add { .. } => MutationKind::Add,
            PendingMutation::Edit { .. } => MutationKind::Edit,
            PendingMutation::Delete { .. } => MutationKind::Delete,
            PendingMutation::Toggle { .. } => MutationKind::Toggle,
        }
    }

    pub fn target(&self) -> Option<&TaskId> {
        match self {
            PendingMutation::Add { .. } => None,
            PendingMutation::Edit { id, .. }
            | PendingMutation::Delete { id }
            | PendingMutation::Toggle { id, .. } => Some(id),
        }
    }

    pub fn key(&self) -> MutationKey {
        MutationKey::new(self.kind(), self.target().cloned())
    }

    /// Issues the request. The returned task, if any, is discarded: local
    /// state only changes through a refetch.
    pub async fn execute(&self, api: &dyn TaskApi, token: &str) -> ApiResult<()> {
        match self {
            PendingMutation::Add { title } => api.create(token, title).await.map(drop),
            PendingMutation::Edit { id, title } => api
                .update(token, id, &TaskPatch::title(title.clone()))
                .await
                .map(drop),
            PendingMutation::Delete { id } => api.delete(token, id).await,
            PendingMutation::Toggle { id, completed } => api
                .update(token, id, &TaskPatch::completed(*completed))
                .await
                .map(drop),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub kind: MutationKind,
    pub target: Option<TaskId>,
}

impl MutationKey {
    pub fn new(kind: MutationKind, target: Option<TaskId>) -> Self {
        Self { kind, target }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MutationState {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed(ApiError),
}

#[derive(Debug, Clone, Default)]
pub struct MutationTracker {
    states: HashMap<MutationKey, MutationState>,
}

impl MutationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &MutationKey) -> MutationState {
        self.states.get(key).cloned().unwrap_or_default()
    }

    pub fn is_pending(&self, key: &MutationKey) -> bool {
        matches!(self.states.get(key), Some(MutationState::Pending))
    }

    pub fn any_pending(&self, kind: MutationKind) -> bool {
        self.states
            .iter()
            .any(|(key, state)| key.kind == kind && *state == MutationState::Pending)
    }

    /// Moves the mutation to `Pending`. Returns `false`, leaving everything
    /// untouched, if an identical mutation is already pending.
    pub fn begin(&mut self, mutation: &PendingMutation) -> bool {
        let key = mutation.key();
        if self.is_pending(&key) {
            return false;
        }
        self.states.insert(key, MutationState::Pending);
        true
    }

    pub fn finish(&mut self, key: &MutationKey, result: &ApiResult<()>) {
        let next = match result {
            Ok(()) => MutationState::Succeeded,
            Err(err) => MutationState::Failed(err.clone()),
        };
        self.states.insert(key.clone(), next);
    }

    /// Returns a finished mutation to `Idle`. A `Pending` entry belongs to a
    /// run still in flight and is left alone.
    pub fn settle(&mut self, key: &MutationKey) {
        if !self.is_pending(key) {
            self.states.remove(key);
        }
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}
