//! Engine command line building and executable discovery.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Engine command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Engine command is empty after parsing")]
    EmptyCommand,
    #[error("Engine executable not found: {0}")]
    NotFound(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if the executable is not found.
    pub fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable =
            resolve_executable_path(&program).ok_or(CommandBuildError::NotFound(program))?;
        Ok((executable, args))
    }
}

/// Builder for the engine launch command.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    /// Base command line, e.g. `matlab -nodesktop -nosplash`.
    pub base: String,
    /// Extra arguments appended verbatim after the split base.
    pub extra_args: Vec<String>,
}

impl EngineCommand {
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            extra_args: Vec::new(),
        }
    }

    /// Append arguments that are not shell-split, so they may contain spaces.
    #[must_use]
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split the command line into program and arguments.
    ///
    /// # Errors
    /// Returns error if the command is unparsable or empty.
    pub fn build(&self) -> Result<CommandParts, CommandBuildError> {
        let mut parts = shlex::split(&self.base)
            .ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        parts.extend(self.extra_args.iter().cloned());
        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }
        let program = parts.remove(0);
        Ok(CommandParts {
            program,
            args: parts,
        })
    }
}

/// Resolve an executable by explicit path or via `PATH`.
#[must_use]
pub fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }

    match which::which(executable) {
        Ok(found) => Some(found),
        Err(e) => {
            tracing::debug!(executable, "Executable lookup failed: {e}");
            None
        }
    }
}
