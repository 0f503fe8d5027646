//! Process-wide session state.
//!
//! A [`SessionStore`] owns the bearer token and identity, persists them
//! through a [`SessionPersistence`] backend so they survive restarts, and
//! publishes every change on a watch channel. Views never read storage
//! directly; they evaluate an [`AccessState`] from the store before showing
//! protected content.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Stable keys the session is persisted under.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const IDENTITY_KEY: &str = "user_email";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "access_token")]
    pub token: String,
    #[serde(rename = "user_email")]
    pub identity: String,
}

impl Session {
    pub fn new(token: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            identity: identity.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionStorageError {
    #[error("failed to access session file '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("session file '{}' is not valid JSON: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait SessionPersistence: Send + Sync {
    fn load(&self) -> Result<Option<Session>, SessionStorageError>;
    fn save(&self, session: &Session) -> Result<(), SessionStorageError>;
    /// Must succeed when nothing is stored.
    fn remove(&self) -> Result<(), SessionStorageError>;
}

/// Stores the session as a small JSON object in a file.
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SessionStorageError {
        SessionStorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SessionPersistence for FileSessionStorage {
    fn load(&self) -> Result<Option<Session>, SessionStorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let session: Session =
            serde_json::from_str(&raw).map_err(|source| SessionStorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        if session.token.is_empty() {
            return Ok(None);
        }
        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<(), SessionStorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
            }
        }
        let encoded = serde_json::to_vec_pretty(session)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, encoded).map_err(|err| self.io_error(err))?;
        fs::rename(&tmp, &self.path).map_err(|err| self.io_error(err))
    }

    fn remove(&self) -> Result<(), SessionStorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionStorage {
    slot: Mutex<Option<Session>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }

    pub fn stored(&self) -> Option<Session> {
        self.slot().clone()
    }

    /// Recovers the contents of a poisoned lock.
    fn slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionPersistence for MemorySessionStorage {
    fn load(&self) -> Result<Option<Session>, SessionStorageError> {
        Ok(self.stored())
    }

    fn save(&self, session: &Session) -> Result<(), SessionStorageError> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), SessionStorageError> {
        *self.slot() = None;
        Ok(())
    }
}

pub struct SessionStore {
    persistence: Arc<dyn SessionPersistence>,
    current: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Reads the persisted session synchronously. An unreadable store is
    /// treated as "no session".
    pub fn load(persistence: Arc<dyn SessionPersistence>) -> Arc<Self> {
        let initial = match persistence.load() {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable persisted session");
                None
            }
        };
        debug!(authenticated = initial.is_some(), "session store loaded");
        let (current, _) = watch::channel(initial);
        Arc::new(Self {
            persistence,
            current,
        })
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Persists the session, then publishes it. On a persistence failure the
    /// previous state is kept.
    pub fn establish(
        &self,
        token: impl Into<String>,
        identity: impl Into<String>,
    ) -> Result<Session, SessionStorageError> {
        let session = Session::new(token, identity);
        self.persistence.save(&session)?;
        self.current.send_replace(Some(session.clone()));
        info!(identity = %session.identity, "session established");
        Ok(session)
    }

    /// Clears the in-memory session first, so a failing backend never leaves
    /// the client authenticated. Safe to call repeatedly.
    pub fn clear(&self) -> Result<(), SessionStorageError> {
        let previous = self.current.send_replace(None);
        if previous.is_some() {
            info!("session cleared");
        }
        self.persistence.remove()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }
}

/// Result of the access guard that runs before protected content renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessState {
    Unchecked,
    Authorized(Session),
    Unauthorized,
}

impl AccessState {
    pub fn evaluate(store: &SessionStore) -> Self {
        match store.current() {
            Some(session) => AccessState::Authorized(session),
            None => AccessState::Unauthorized,
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, AccessState::Authorized(_))
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            AccessState::Authorized(session) => Some(&session.token),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
