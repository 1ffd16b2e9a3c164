//! The process-wide engine session.

use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::engine::{Engine, EngineError};

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("An engine session is already active: {0}")]
    AlreadyActive(String),
}

/// A live connection to one engine.
pub struct Session {
    name: String,
    engine: Arc<dyn Engine>,
}

impl Session {
    /// Wrap a connected engine.
    #[must_use]
    pub fn new(name: impl Into<String>, engine: Arc<dyn Engine>) -> Self {
        Self {
            name: name.into(),
            engine,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a blocking engine call off the async scheduler.
    ///
    /// The closure receives the shared engine handle, not a copy of the
    /// connection. There is no timeout and no cancellation: once issued,
    /// the call runs to completion even if the caller stops waiting.
    ///
    /// # Errors
    /// Returns a communication error if the blocking task panicked.
    pub async fn call<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&dyn Engine) -> T + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(engine.as_ref()))
            .await
            .map_err(|e| EngineError::Communication(format!("engine call aborted: {e}")))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Write-once slot holding the single session.
///
/// Shared by reference between the coordinator and the accessor. Once a
/// session is attached it stays for the process lifetime; there is no
/// reconnection.
#[derive(Debug, Default)]
pub struct SessionCell {
    slot: OnceLock<Session>,
}

impl SessionCell {
    /// A cell with no session yet.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A cell already holding `session`.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        let cell = Self::empty();
        let _ = cell.slot.set(session);
        cell
    }

    /// Attach the session.
    ///
    /// # Errors
    /// Returns error if a session is already attached.
    pub fn attach(&self, session: Session) -> Result<&Session, SessionError> {
        self.slot.set(session).map_err(|rejected| {
            SessionError::AlreadyActive(format!(
                "refusing '{}' while '{}' is attached",
                rejected.name,
                self.get().map_or("<unknown>", Session::name)
            ))
        })?;
        self.get()
            .ok_or_else(|| SessionError::AlreadyActive("session slot unavailable".to_string()))
    }

    #[must_use]
    pub fn get(&self) -> Option<&Session> {
        self.slot.get()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slot.get().is_some()
    }
}
