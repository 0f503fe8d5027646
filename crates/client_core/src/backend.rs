//! Remote backend access: credential checks and task CRUD.
//!
//! Every call is a single request with no retry. Failures are mapped onto
//! [`ApiError`] so callers only ever see the client error taxonomy.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Task, TaskId},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateTaskRequest, Credentials, ErrorBody, SignInResponse, SignUpResponse, TaskPatch,
        SIGNIN_PATH, SIGNUP_PATH, TODOS_PATH,
    },
};
use tracing::{debug, warn};
use url::Url;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub const LOGIN_FAILED: &str = "Login failed";
pub const SIGNUP_FAILED: &str = "Signup failed";
pub const FETCH_TODOS_FAILED: &str = "Failed to fetch todos";
pub const ADD_TODO_FAILED: &str = "Failed to add todo";
pub const EDIT_TODO_FAILED: &str = "Failed to edit todo";
pub const UPDATE_TODO_FAILED: &str = "Failed to update todo";
pub const DELETE_TODO_FAILED: &str = "Failed to delete todo";

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> ApiResult<SignInResponse>;
    async fn sign_up(&self, credentials: &Credentials) -> ApiResult<SignUpResponse>;
}

/// Task collection access, scoped by the caller's bearer token.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn list(&self, token: &str) -> ApiResult<Vec<Task>>;
    async fn create(&self, token: &str, title: &str) -> ApiResult<Task>;
    async fn update(&self, token: &str, id: &TaskId, patch: &TaskPatch) -> ApiResult<Task>;
    async fn delete(&self, token: &str, id: &TaskId) -> ApiResult<()>;
}

#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::network(format!("invalid API base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn todo_endpoint(&self, id: &TaskId) -> ApiResult<Url> {
        let mut segments: Vec<&str> = TODOS_PATH.to_vec();
        segments.push(id.as_str());
        self.endpoint(&segments)
    }
}

async fn dispatch(request: RequestBuilder, fallback: &str) -> ApiResult<Response> {
    let response = request.send().await.map_err(|err| {
        warn!(error = %err, "request failed before a response arrived");
        ApiError::network(fallback)
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = ErrorCode::from_status(status.as_u16());
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|body| body.message_text())
        .unwrap_or_else(|| fallback.to_string());
    warn!(status = status.as_u16(), ?code, %message, "backend rejected request");
    Err(ApiError::new(code, message))
}

async fn decode<T: DeserializeOwned>(response: Response, fallback: &str) -> ApiResult<T> {
    response.json::<T>().await.map_err(|err| {
        warn!(error = %err, "failed to decode backend response");
        ApiError::network(fallback)
    })
}

#[async_trait]
impl AuthApi for HttpBackend {
    async fn sign_in(&self, credentials: &Credentials) -> ApiResult<SignInResponse> {
        let url = self.endpoint(SIGNIN_PATH)?;
        debug!(%url, email = %credentials.email, "signing in");
        let response = dispatch(self.http.post(url).json(credentials), LOGIN_FAILED).await?;
        decode(response, LOGIN_FAILED).await
    }

    async fn sign_up(&self, credentials: &Credentials) -> ApiResult<SignUpResponse> {
        let url = self.endpoint(SIGNUP_PATH)?;
        debug!(%url, email = %credentials.email, "signing up");
        let response = dispatch(self.http.post(url).json(credentials), SIGNUP_FAILED).await?;
        decode(response, SIGNUP_FAILED).await
    }
}

#[async_trait]
impl TaskApi for HttpBackend {
    async fn list(&self, token: &str) -> ApiResult<Vec<Task>> {
        let url = self.endpoint(TODOS_PATH)?;
        let response = dispatch(self.http.get(url).bearer_auth(token), FETCH_TODOS_FAILED).await?;
        decode(response, FETCH_TODOS_FAILED).await
    }

    async fn create(&self, token: &str, title: &str) -> ApiResult<Task> {
        let url = self.endpoint(TODOS_PATH)?;
        let body = CreateTaskRequest {
            title: title.to_string(),
        };
        let response = dispatch(
            self.http.post(url).bearer_auth(token).json(&body),
            ADD_TODO_FAILED,
        )
        .await?;
        decode(response, ADD_TODO_FAILED).await
    }

    async fn update(&self, token: &str, id: &TaskId, patch: &TaskPatch) -> ApiResult<Task> {
        let fallback = if patch.title.is_some() {
            EDIT_TODO_FAILED
        } else {
            UPDATE_TODO_FAILED
        };
        let url = self.todo_endpoint(id)?;
        let response = dispatch(
            self.http.patch(url).bearer_auth(token).json(patch),
            fallback,
        )
        .await?;
        decode(response, fallback).await
    }

    async fn delete(&self, token: &str, id: &TaskId) -> ApiResult<()> {
        let url = self.todo_endpoint(id)?;
        dispatch(self.http.delete(url).bearer_auth(token), DELETE_TODO_FAILED).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
