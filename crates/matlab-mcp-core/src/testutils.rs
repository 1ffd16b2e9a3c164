//! Scripted in-memory engine for tests.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::engine::{Engine, EngineError, EngineValue, NdArray};

/// A call received by [`MockEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// `contents` is the script file as it was on disk during the call.
    RunScript { path: PathBuf, contents: String },
    EvalCapture(String),
    Eval(String),
    ReadVariable(String),
}

#[derive(Default)]
struct MockState {
    calls: Vec<EngineCall>,
    run_error: Option<EngineError>,
    run_delay: Option<Duration>,
    capture: Option<Result<String, EngineError>>,
    read_error: Option<EngineError>,
    failing_lines: Vec<String>,
    workspace: HashMap<String, EngineValue>,
}

/// Engine double with a tiny workspace.
///
/// Successful calls apply `name = <number>;` lines to the workspace, so
/// side effects of partial execution can be observed.
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `run_script` fail with `err`.
    #[must_use]
    pub fn failing_run(mut self, err: EngineError) -> Self {
        self.state_mut().run_error = Some(err);
        self
    }

    /// Make `run_script` block for `delay` before reading the script.
    #[must_use]
    pub fn slow_run(mut self, delay: Duration) -> Self {
        self.state_mut().run_delay = Some(delay);
        self
    }

    /// Make `eval_capture` succeed with `output`.
    #[must_use]
    pub fn capturing(mut self, output: impl Into<String>) -> Self {
        self.state_mut().capture = Some(Ok(output.into()));
        self
    }

    /// Make `eval_capture` fail with `err`.
    #[must_use]
    pub fn failing_capture(mut self, err: EngineError) -> Self {
        self.state_mut().capture = Some(Err(err));
        self
    }

    /// Make `read_variable` fail with `err`.
    #[must_use]
    pub fn failing_read(mut self, err: EngineError) -> Self {
        self.state_mut().read_error = Some(err);
        self
    }

    /// Make `eval` raise a script error for lines containing `pattern`.
    #[must_use]
    pub fn failing_line(mut self, pattern: impl Into<String>) -> Self {
        self.state_mut().failing_lines.push(pattern.into());
        self
    }

    /// Seed the workspace.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: EngineValue) -> Self {
        self.state_mut().workspace.insert(name.into(), value);
        self
    }

    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    /// Current workspace value of `name`.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<EngineValue> {
        self.state().workspace.get(name).cloned()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MockState {
    fn apply(&mut self, code: &str) {
        for line in code.lines() {
            let Some((lhs, rhs)) = line.split_once('=') else {
                continue;
            };
            let name = lhs.trim();
            let is_ident = name.chars().next().is_some_and(char::is_alphabetic)
                && name.chars().all(|c| c.is_alphanumeric() || c == '_');
            if let (true, Ok(value)) = (is_ident, rhs.trim().trim_end_matches(';').parse::<f64>()) {
                self.workspace
                    .insert(name.to_string(), EngineValue::double(NdArray::scalar(value)));
            }
        }
    }
}

impl Engine for MockEngine {
    fn run_script(&self, script: &Path) -> Result<(), EngineError> {
        let delay = self.state().run_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let contents = std::fs::read_to_string(script)
            .map_err(|e| EngineError::Communication(format!("cannot read script: {e}")))?;
        let mut state = self.state();
        state.calls.push(EngineCall::RunScript {
            path: script.to_path_buf(),
            contents: contents.clone(),
        });
        if let Some(err) = state.run_error.clone() {
            return Err(err);
        }
        state.apply(&contents);
        Ok(())
    }

    fn eval_capture(&self, code: &str) -> Result<String, EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::EvalCapture(code.to_string()));
        let output = state.capture.clone().unwrap_or_else(|| Ok(String::new()))?;
        state.apply(code);
        Ok(output)
    }

    fn eval(&self, statement: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::Eval(statement.to_string()));
        if state.failing_lines.iter().any(|p| statement.contains(p.as_str())) {
            return Err(EngineError::Execution(format!(
                "Error evaluating '{statement}'"
            )));
        }
        state.apply(statement);
        Ok(())
    }

    fn read_variable(&self, name: &str) -> Result<Option<EngineValue>, EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::ReadVariable(name.to_string()));
        if let Some(err) = state.read_error.clone() {
            return Err(err);
        }
        Ok(state.workspace.get(name).cloned())
    }
}
