//! Execution fallback chain and result marshalling for a shared MATLAB
//! engine session.
//!
//! This crate provides:
//! - `Engine` - The blocking engine contract and engine-native values
//! - `ExecutionCoordinator` - File-run, captured-eval, line-by-line fallback
//! - `WorkspaceAccessor` - Variable reads routed through the converter
//! - `SessionCell` - The single process-wide session slot

pub mod convert;
pub mod coordinator;
pub mod engine;
pub mod outcome;
pub mod session;
pub mod strategy;
pub mod workspace;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use convert::{ConvertedValue, convert};
pub use coordinator::ExecutionCoordinator;
pub use engine::{Engine, EngineError, EngineValue, NdArray};
pub use outcome::{ExecutionOutcome, Failure, FailureKind, Stage};
pub use session::{Session, SessionCell, SessionError};
pub use workspace::WorkspaceAccessor;
