//! Request outcomes and the failure taxonomy.

use std::fmt;

use serde::Serialize;

use crate::engine::EngineError;

/// Which strategy of the chain produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FileRun,
    CapturedEval,
    LineByLine,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileRun => "file_run",
            Self::CapturedEval => "captured_eval",
            Self::LineByLine => "line_by_line",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    NoSession,
    #[serde(rename = "ScriptExecutionError")]
    ScriptExecution,
    #[serde(rename = "EngineCommunicationError")]
    EngineCommunication,
    #[serde(rename = "LocalIOError")]
    LocalIo,
    NotFound,
    Unserializable,
}

impl FailureKind {
    /// Wire name used in `error_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoSession => "NoSession",
            Self::ScriptExecution => "ScriptExecutionError",
            Self::EngineCommunication => "EngineCommunicationError",
            Self::LocalIo => "LocalIOError",
            Self::NotFound => "NotFound",
            Self::Unserializable => "Unserializable",
        }
    }

    /// Only a script error may hand the request to the next strategy.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::ScriptExecution)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with an optional originating stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub stage: Option<Stage>,
    pub message: String,
}

impl Failure {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn no_session() -> Self {
        Self::new(FailureKind::NoSession, "No active MATLAB session found.")
    }

    /// Tag the failure with the stage that produced it.
    #[must_use]
    pub const fn at(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }
}

impl From<EngineError> for Failure {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Execution(message) => Self::new(FailureKind::ScriptExecution, message),
            err @ EngineError::Communication(_) => {
                Self::new(FailureKind::EngineCommunication, err.to_string())
            }
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} at {stage}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Failure {}

/// Final result of one `run` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success { stage: Stage, output: String },
    Failure(Failure),
}

impl ExecutionOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The stage that produced this outcome, if any ran.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Success { stage, .. } => Some(*stage),
            Self::Failure(failure) => failure.stage,
        }
    }
}
