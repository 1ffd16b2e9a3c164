//! Orchestration of the strategy chain for one `run` request.

use std::{path::Path, sync::Arc};

use crate::{
    outcome::{ExecutionOutcome, Failure, FailureKind},
    session::SessionCell,
    strategy::{CapturedEvalStrategy, ExecutionStrategy, FileRunStrategy, LineByLineStrategy},
};

/// Runs code through file-run, captured-eval and line-by-line in order.
///
/// The first success wins. A script error moves on to the next strategy;
/// any other failure ends the request at the stage where it happened.
pub struct ExecutionCoordinator {
    session: Arc<SessionCell>,
    chain: Vec<Arc<dyn ExecutionStrategy>>,
}

impl ExecutionCoordinator {
    /// Create a coordinator writing its script artifact into `artifact_dir`.
    #[must_use]
    pub fn new(session: Arc<SessionCell>, artifact_dir: &Path) -> Self {
        Self {
            session,
            chain: vec![
                Arc::new(FileRunStrategy::new(artifact_dir)),
                Arc::new(CapturedEvalStrategy),
                Arc::new(LineByLineStrategy),
            ],
        }
    }

    /// Execute `code` against the session.
    pub async fn run(&self, code: &str) -> ExecutionOutcome {
        let Some(session) = self.session.get() else {
            tracing::warn!("Run requested without an active session");
            return ExecutionOutcome::Failure(Failure::no_session());
        };

        let code: Arc<str> = Arc::from(code);
        let mut strategies = self.chain.iter().peekable();

        while let Some(strategy) = strategies.next() {
            let stage = strategy.stage();
            tracing::info!(%stage, "Executing MATLAB code");

            let task_strategy = Arc::clone(strategy);
            let task_code = Arc::clone(&code);
            let result = match session
                .call(move |engine| task_strategy.execute(engine, &task_code))
                .await
            {
                Ok(result) => result,
                Err(e) => Err(Failure::from(e)),
            };

            match result {
                Ok(output) => {
                    tracing::info!(%stage, "Code executed successfully");
                    return ExecutionOutcome::Success { stage, output };
                }
                Err(failure) if failure.kind.is_recoverable() && strategies.peek().is_some() => {
                    tracing::warn!(%stage, error = %failure.message, "Strategy failed, falling back");
                }
                Err(failure) => {
                    tracing::error!(%stage, kind = %failure.kind, error = %failure.message, "Error executing MATLAB code");
                    return ExecutionOutcome::Failure(failure.at(stage));
                }
            }
        }

        ExecutionOutcome::Failure(Failure::new(
            FailureKind::EngineCommunication,
            "No execution strategy available",
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        engine::{EngineError, EngineValue, NdArray},
        outcome::Stage,
        session::Session,
        strategy::{FILE_RUN_MESSAGE, LINE_BY_LINE_MESSAGE},
        testutils::{EngineCall, MockEngine},
    };

    fn coordinator(engine: MockEngine) -> (ExecutionCoordinator, Arc<MockEngine>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine);
        let cell = Arc::new(SessionCell::with_session(Session::new("mock", engine.clone())));
        (ExecutionCoordinator::new(cell, dir.path()), engine, dir)
    }

    fn is_run(call: &EngineCall) -> bool {
        matches!(call, EngineCall::RunScript { .. })
    }

    #[tokio::test]
    async fn test_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = ExecutionCoordinator::new(Arc::new(SessionCell::empty()), dir.path());

        let outcome = coordinator.run("x = 5;").await;

        let ExecutionOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::NoSession);
        assert_eq!(failure.stage, None);
    }

    #[tokio::test]
    async fn test_file_run_short_circuits() {
        let (coordinator, engine, _dir) = coordinator(MockEngine::new());

        let outcome = coordinator.run("x = 5;").await;

        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                stage: Stage::FileRun,
                output: FILE_RUN_MESSAGE.to_string(),
            }
        );
        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert!(is_run(&calls[0]));
        assert_eq!(engine.variable("x"), Some(EngineValue::double(NdArray::scalar(5.0))));
    }

    #[tokio::test]
    async fn test_script_error_falls_back_to_captured_eval() {
        let engine = MockEngine::new()
            .failing_run(EngineError::Execution("Invalid use of script".into()))
            .capturing("2\n");
        let (coordinator, engine, _dir) = coordinator(engine);

        let outcome = coordinator.run("disp(1+1)").await;

        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                stage: Stage::CapturedEval,
                output: "2\n".to_string(),
            }
        );
        let calls = engine.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], EngineCall::EvalCapture("disp(1+1)".into()));
    }

    #[tokio::test]
    async fn test_falls_through_to_line_by_line() {
        let engine = MockEngine::new()
            .failing_run(EngineError::Execution("syntax".into()))
            .failing_capture(EngineError::Execution("syntax".into()));
        let (coordinator, engine, _dir) = coordinator(engine);

        let outcome = coordinator.run("a = 1;\n% comment\nb = 2;").await;

        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                stage: Stage::LineByLine,
                output: LINE_BY_LINE_MESSAGE.to_string(),
            }
        );
        let evals: Vec<_> = engine
            .calls()
            .into_iter()
            .filter(|c| matches!(c, EngineCall::Eval(_)))
            .collect();
        assert_eq!(
            evals,
            vec![EngineCall::Eval("a = 1;".into()), EngineCall::Eval("b = 2;".into())]
        );
    }

    #[tokio::test]
    async fn test_line_failure_keeps_partial_side_effects() {
        let engine = MockEngine::new()
            .failing_run(EngineError::Execution("syntax".into()))
            .failing_capture(EngineError::Execution("syntax".into()))
            .failing_line("undefined_fn");
        let (coordinator, engine, _dir) = coordinator(engine);

        let outcome = coordinator.run("a = 1;\nundefined_fn(3)\nb = 2;").await;

        let ExecutionOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::ScriptExecution);
        assert_eq!(failure.stage, Some(Stage::LineByLine));
        assert!(failure.message.contains("Line 2"));
        assert!(failure.message.contains("undefined_fn(3)"));
        assert!(engine.variable("a").is_some());
        assert!(engine.variable("b").is_none());
    }

    #[tokio::test]
    async fn test_first_line_failure_stops_immediately() {
        let engine = MockEngine::new()
            .failing_run(EngineError::Execution("syntax".into()))
            .failing_capture(EngineError::Execution("syntax".into()))
            .failing_line("error(");
        let (coordinator, engine, _dir) = coordinator(engine);

        let outcome = coordinator.run("error('first')\nc = 3;").await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.stage(), Some(Stage::LineByLine));
        assert!(engine.variable("c").is_none());
        assert!(!engine.calls().contains(&EngineCall::Eval("c = 3;".into())));
    }

    #[tokio::test]
    async fn test_communication_failure_is_fatal() {
        let engine = MockEngine::new()
            .failing_run(EngineError::Communication("engine process exited".into()))
            .capturing("never");
        let (coordinator, engine, _dir) = coordinator(engine);

        let outcome = coordinator.run("x = 5;").await;

        let ExecutionOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::EngineCommunication);
        assert_eq!(failure.stage, Some(Stage::FileRun));
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_communication_failure_at_capture_skips_line_by_line() {
        let engine = MockEngine::new()
            .failing_run(EngineError::Execution("syntax".into()))
            .failing_capture(EngineError::Communication("broken pipe".into()));
        let (coordinator, engine, _dir) = coordinator(engine);

        let outcome = coordinator.run("x = 5;").await;

        assert_eq!(outcome.stage(), Some(Stage::CapturedEval));
        assert!(
            !engine
                .calls()
                .iter()
                .any(|c| matches!(c, EngineCall::Eval(_)))
        );
    }

    #[tokio::test]
    async fn test_overlapping_file_runs_keep_their_own_script() {
        let engine = MockEngine::new().slow_run(Duration::from_millis(200));
        let (coordinator, engine, _dir) = coordinator(engine);

        let first = coordinator.run("a = 1;");
        let second = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            coordinator.run("b = 2;").await
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.stage(), Some(Stage::FileRun));
        assert_eq!(second.stage(), Some(Stage::FileRun));
        assert!(first.is_success() && second.is_success());
        let scripts: Vec<_> = engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::RunScript { contents, .. } => Some(contents),
                _ => None,
            })
            .collect();
        assert_eq!(scripts, vec!["a = 1;".to_string(), "b = 2;".to_string()]);
        assert!(engine.variable("a").is_some());
        assert!(engine.variable("b").is_some());
    }
}
