//! Process-backed MATLAB engine connection.
//!
//! Provides:
//! - `ProcessEngine` - `Engine` implementation over a REPL process
//! - `EngineConfig` - Connection settings
//! - Command parsing and executable discovery

pub mod command;
pub mod config;
pub mod process;
pub mod script;
pub mod transcript;

pub use command::{CommandBuildError, EngineCommand, resolve_executable_path};
pub use config::{DEFAULT_ENGINE_COMMAND, EngineConfig};
pub use process::{ConnectError, ProcessEngine};
