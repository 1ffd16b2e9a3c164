//! The three execution strategies.
//!
//! Each strategy wraps one engine call pattern and reports either the text
//! to hand back to the caller or a classified [`Failure`]. Strategies are
//! blocking; the coordinator moves them off the async scheduler.

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use crate::{
    engine::Engine,
    outcome::{Failure, FailureKind, Stage},
};

/// Fixed name of the transient script artifact.
pub const SCRIPT_ARTIFACT_NAME: &str = "temp_script.m";

/// Line comment marker of the script language.
pub const COMMENT_MARKER: char = '%';

pub const FILE_RUN_MESSAGE: &str = "Code executed successfully via temp file.";
pub const LINE_BY_LINE_MESSAGE: &str = "Code executed successfully line by line.";

/// One way of executing a block of code against the engine.
pub trait ExecutionStrategy: Send + Sync {
    fn stage(&self) -> Stage;

    /// Execute `code`, returning the output to report on success.
    ///
    /// # Errors
    /// Returns a failure classified by kind; only `ScriptExecution` is
    /// recoverable.
    fn execute(&self, engine: &dyn Engine, code: &str) -> Result<String, Failure>;
}

/// Writes the code to a script file and runs it.
///
/// Console text is not captured in this mode. The artifact path is shared,
/// so concurrent runs take turns from write through removal.
#[derive(Debug)]
pub struct FileRunStrategy {
    artifact: PathBuf,
    artifact_lock: Mutex<()>,
}

impl FileRunStrategy {
    /// Use `<dir>/temp_script.m` as the artifact.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            artifact: dir.join(SCRIPT_ARTIFACT_NAME),
            artifact_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    fn write_artifact(&self, code: &str) -> Result<(), Failure> {
        let local_io = |e: std::io::Error| {
            Failure::new(
                FailureKind::LocalIo,
                format!(
                    "Failed to write script artifact {}: {e}",
                    self.artifact.display()
                ),
            )
        };
        if let Some(parent) = self.artifact.parent() {
            std::fs::create_dir_all(parent).map_err(local_io)?;
        }
        std::fs::write(&self.artifact, code).map_err(local_io)
    }
}

impl ExecutionStrategy for FileRunStrategy {
    fn stage(&self) -> Stage {
        Stage::FileRun
    }

    fn execute(&self, engine: &dyn Engine, code: &str) -> Result<String, Failure> {
        let _artifact = self
            .artifact_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.write_artifact(code)?;
        let result = engine.run_script(&self.artifact);

        if let Err(e) = std::fs::remove_file(&self.artifact) {
            tracing::debug!(artifact = %self.artifact.display(), "Failed to remove script artifact: {e}");
        }

        result
            .map(|()| FILE_RUN_MESSAGE.to_string())
            .map_err(Failure::from)
    }
}

/// Evaluates the whole block and returns the console text it produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapturedEvalStrategy;

impl ExecutionStrategy for CapturedEvalStrategy {
    fn stage(&self) -> Stage {
        Stage::CapturedEval
    }

    fn execute(&self, engine: &dyn Engine, code: &str) -> Result<String, Failure> {
        engine.eval_capture(code).map_err(Failure::from)
    }
}

/// Evaluates one line at a time, stopping at the first failing line.
///
/// Lines that already ran are not rolled back.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineByLineStrategy;

impl LineByLineStrategy {
    /// Non-blank, non-comment lines with their 1-based line numbers.
    pub fn statements(code: &str) -> impl Iterator<Item = (usize, &str)> {
        code.lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
    }
}

impl ExecutionStrategy for LineByLineStrategy {
    fn stage(&self) -> Stage {
        Stage::LineByLine
    }

    fn execute(&self, engine: &dyn Engine, code: &str) -> Result<String, Failure> {
        let mut executed = 0usize;
        for (line_no, statement) in Self::statements(code) {
            if let Err(e) = engine.eval(statement) {
                let failure = Failure::from(e);
                tracing::debug!(line = line_no, executed, "Line-by-line execution stopped");
                return Err(Failure {
                    message: format!("Line {line_no} (`{statement}`): {}", failure.message),
                    ..failure
                });
            }
            executed += 1;
        }
        tracing::debug!(executed, "Line-by-line execution finished");
        Ok(LINE_BY_LINE_MESSAGE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::EngineError,
        testutils::{EngineCall, MockEngine},
    };

    #[test]
    fn test_file_run_writes_then_removes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = FileRunStrategy::new(dir.path());
        let engine = MockEngine::new();

        let output = strategy.execute(&engine, "x = 5;").unwrap();

        assert_eq!(output, FILE_RUN_MESSAGE);
        assert_eq!(
            engine.calls(),
            vec![EngineCall::RunScript {
                path: dir.path().join(SCRIPT_ARTIFACT_NAME),
                contents: "x = 5;".to_string(),
            }]
        );
        assert!(!strategy.artifact().exists());
    }

    #[test]
    fn test_file_run_artifact_failure_is_local_io() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let strategy = FileRunStrategy::new(&blocker);
        let engine = MockEngine::new();

        let failure = strategy.execute(&engine, "x = 5;").unwrap_err();

        assert_eq!(failure.kind, FailureKind::LocalIo);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_file_run_script_error_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = FileRunStrategy::new(dir.path());
        let engine = MockEngine::new().failing_run(EngineError::Execution("parse error".into()));

        let failure = strategy.execute(&engine, "disp(1+1)").unwrap_err();

        assert_eq!(failure.kind, FailureKind::ScriptExecution);
        assert!(failure.kind.is_recoverable());
        assert!(!strategy.artifact().exists());
    }

    #[test]
    fn test_statements_skip_blank_and_comment_lines() {
        let code = "% setup\n\n  a = 1;\r\n   % note\nb = 2;\n";
        let statements: Vec<_> = LineByLineStrategy::statements(code).collect();
        assert_eq!(statements, vec![(3, "a = 1;"), (5, "b = 2;")]);
    }

    #[test]
    fn test_line_by_line_reports_failing_line() {
        let engine = MockEngine::new().failing_line("error(");
        let code = "a = 1;\nerror('boom')\nb = 2;";

        let failure = LineByLineStrategy.execute(&engine, code).unwrap_err();

        assert_eq!(failure.kind, FailureKind::ScriptExecution);
        assert!(failure.message.starts_with("Line 2 (`error('boom')`)"));
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::Eval("a = 1;".into()),
                EngineCall::Eval("error('boom')".into()),
            ]
        );
        assert!(engine.variable("a").is_some());
        assert!(engine.variable("b").is_none());
    }

    #[test]
    fn test_captured_eval_returns_console_text() {
        let engine = MockEngine::new().capturing("2\n");
        let output = CapturedEvalStrategy.execute(&engine, "disp(1+1)").unwrap();
        assert_eq!(output, "2\n");
    }
}
