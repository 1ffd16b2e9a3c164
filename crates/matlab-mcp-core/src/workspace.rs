//! Reading variables from the live workspace.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    convert::convert,
    outcome::{Failure, FailureKind},
    session::SessionCell,
};

/// Reads named workspace variables and converts them for transport.
pub struct WorkspaceAccessor {
    session: Arc<SessionCell>,
}

impl WorkspaceAccessor {
    #[must_use]
    pub const fn new(session: Arc<SessionCell>) -> Self {
        Self { session }
    }

    /// Fetch `name` as JSON.
    ///
    /// The value is converted and then serialized before returning, so a
    /// success is always encodable.
    ///
    /// # Errors
    /// `NoSession`, `NotFound`, `Unserializable`, or the engine's own
    /// failure class when the read itself fails.
    pub async fn get_variable(&self, name: &str) -> Result<Value, Failure> {
        let session = self.session.get().ok_or_else(Failure::no_session)?;

        let lookup = name.to_string();
        let raw = session
            .call(move |engine| engine.read_variable(&lookup))
            .await
            .and_then(|result| result)
            .map_err(|e| {
                tracing::error!(variable = name, "Error reading workspace variable: {e}");
                Failure::from(e)
            })?;

        let Some(raw) = raw else {
            return Err(Failure::new(
                FailureKind::NotFound,
                format!("Variable '{name}' not found in MATLAB workspace."),
            ));
        };

        serde_json::to_value(convert(&raw)).map_err(|e| {
            Failure::new(
                FailureKind::Unserializable,
                format!(
                    "Variable '{name}' of type '{}' could not be serialized: {e}",
                    raw.type_name()
                ),
            )
        })
    }
}
