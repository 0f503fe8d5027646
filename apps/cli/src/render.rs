//! Plain-text rendering of view state for the terminal.

use client_core::{AuthOutcome, FieldErrors, MutationOutcome, Redirect, TodoViewState};
use shared::domain::Task;

pub fn task_line(task: &Task) -> String {
    let mark = if task.completed { "x" } else { " " };
    format!("[{mark}] {:<8} {}", task.id, task.title)
}

pub fn task_list(state: &TodoViewState) -> String {
    let Some(tasks) = state.visible_tasks() else {
        return "Loading...".to_string();
    };
    if tasks.is_empty() {
        return "No tasks yet.".to_string();
    }
    tasks.iter().map(task_line).collect::<Vec<_>>().join("\n")
}

pub fn field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("  {field}: {message}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn redirect(redirect: &Redirect) -> String {
    match &redirect.notice {
        Some(notice) => format!("{notice} -> {}", redirect.to.path()),
        None => format!("-> {}", redirect.to.path()),
    }
}

pub fn mutation_outcome(outcome: &MutationOutcome) -> Option<String> {
    match outcome {
        MutationOutcome::Applied => None,
        MutationOutcome::Rejected => Some("Nothing to submit.".to_string()),
        MutationOutcome::Invalid(errors) => Some(format!("Invalid input:\n{}", field_errors(errors))),
        MutationOutcome::Failed(err) => Some(format!("Error: {}", err.message)),
        MutationOutcome::SessionExpired => {
            Some("Session expired, please log in again.".to_string())
        }
        MutationOutcome::Discarded => Some("Not logged in.".to_string()),
    }
}

pub fn auth_outcome(outcome: &AuthOutcome) -> String {
    match outcome {
        AuthOutcome::Redirect(target) => redirect(target),
        AuthOutcome::Invalid(errors) => format!("Invalid input:\n{}", field_errors(errors)),
        AuthOutcome::Failed(message) => format!("Error: {message}"),
        AuthOutcome::Busy => "A request is already in progress.".to_string(),
    }
}
