use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Endpoint paths as URL segments relative to the API base.
pub const SIGNIN_PATH: &[&str] = &["auth", "signin"];
pub const SIGNUP_PATH: &[&str] = &["auth", "signup"];
pub const TODOS_PATH: &[&str] = &["todos"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInResponse {
    pub access_token: String,
    pub email: String,
}

/// The signup endpoint's payload is not part of the contract; it is kept
/// verbatim for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignUpResponse(pub Value);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
}

/// Partial update for `PATCH /todos/{id}`. Exactly one field is set by the
/// constructors; unset fields are omitted from the body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            completed: None,
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            title: None,
            completed: Some(completed),
        }
    }
}

/// Error payload returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<Value>,
}

impl ErrorBody {
    /// Returns the human-readable message, joining array messages with ", ".
    pub fn message_text(&self) -> Option<String> {
        let text = match self.message.as_ref()? {
            Value::String(message) => message.clone(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            _ => return None,
        };
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}
