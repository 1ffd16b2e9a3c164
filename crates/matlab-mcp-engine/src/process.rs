//! Engine backed by a MATLAB process driven over its stdin/stdout.

use std::{
    io::{BufRead, BufReader, Write},
    path::Path,
    process::{ChildStderr, ChildStdin, ChildStdout, Command, Stdio},
    sync::{Mutex, PoisonError},
};

use command_group::{CommandGroup, GroupChild};
use matlab_mcp_core::{Engine, EngineError, EngineValue};
use thiserror::Error;

use crate::{
    command::{CommandBuildError, EngineCommand},
    config::EngineConfig,
    script::{self, Frame},
    transcript::{Transcript, parse_variable},
};

/// Connection error.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Command(#[from] CommandBuildError),
    #[error("Failed to start engine: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Engine process has no {0} pipe")]
    MissingPipe(&'static str),
    #[error("Engine handshake failed: {0}")]
    Handshake(#[from] EngineError),
}

struct Connection {
    child: GroupChild,
    stdin: ChildStdin,
    transcript: Transcript<BufReader<ChildStdout>>,
    next_frame: u64,
    /// Set once the pipe breaks; the session is never revived.
    closed: Option<String>,
}

impl Connection {
    fn call(&mut self, body: &str) -> Result<String, EngineError> {
        if let Some(reason) = &self.closed {
            return Err(EngineError::Communication(format!(
                "engine session is closed: {reason}"
            )));
        }

        self.next_frame += 1;
        let frame = Frame::new(self.next_frame);
        let block = frame.wrap(body);

        let result = self
            .stdin
            .write_all(block.as_bytes())
            .and_then(|()| self.stdin.flush())
            .map_err(|e| EngineError::Communication(format!("failed to write to engine: {e}")))
            .and_then(|()| self.transcript.read_reply(&frame));

        if let Err(EngineError::Communication(reason)) = &result {
            tracing::error!(pid = self.child.id(), "Lost connection to MATLAB engine: {reason}");
            self.closed = Some(reason.clone());
        }
        result
    }
}

/// A MATLAB (or compatible) REPL process.
///
/// The process runs in its own process group and is killed on drop. Calls
/// are serialized by the connection mutex, matching the engine's one
/// call at a time.
pub struct ProcessEngine {
    name: String,
    conn: Mutex<Connection>,
}

impl ProcessEngine {
    /// Start the engine described by `config` and wait until it answers.
    ///
    /// # Errors
    /// Returns error if the executable cannot be found or started, or if
    /// the engine does not answer the handshake.
    pub fn connect(config: &EngineConfig) -> Result<Self, ConnectError> {
        let (program, args) = EngineCommand::new(config.command.as_str())
            .with_args(config.args.iter().cloned())
            .build()?
            .into_resolved()?;
        tracing::info!(program = %program.display(), ?args, "Starting MATLAB engine");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .group_spawn()?;

        let stdin = child
            .inner()
            .stdin
            .take()
            .ok_or(ConnectError::MissingPipe("stdin"))?;
        let stdout = child
            .inner()
            .stdout
            .take()
            .ok_or(ConnectError::MissingPipe("stdout"))?;
        if let Some(stderr) = child.inner().stderr.take() {
            drain_stderr(stderr);
        }

        let program_name = program
            .file_name()
            .map_or_else(|| program.to_string_lossy(), |n| n.to_string_lossy())
            .into_owned();
        let name = format!("{program_name} (pid {})", child.id());

        let engine = Self {
            name,
            conn: Mutex::new(Connection {
                child,
                stdin,
                transcript: Transcript::new(BufReader::new(stdout)),
                next_frame: 0,
                closed: None,
            }),
        };

        engine.call("% handshake")?;
        tracing::info!(session = %engine.name, "Connected to MATLAB engine");
        Ok(engine)
    }

    /// Human-readable session name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, body: &str) -> Result<String, EngineError> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Communication("engine connection lock poisoned".to_string()))?
            .call(body)
    }
}

fn drain_stderr(stderr: ChildStderr) {
    let spawned = std::thread::Builder::new()
        .name("engine-stderr".to_string())
        .spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                tracing::debug!(target: "engine_stderr", "{line}");
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("Failed to start engine stderr reader: {e}");
    }
}

impl Engine for ProcessEngine {
    fn run_script(&self, script: &Path) -> Result<(), EngineError> {
        let echo = self.call(&script::run_script(script))?;
        if !echo.trim().is_empty() {
            tracing::debug!(target: "engine_stdout", "{}", echo.trim_end());
        }
        Ok(())
    }

    fn eval_capture(&self, code: &str) -> Result<String, EngineError> {
        self.call(&script::eval_capture(code))
    }

    fn eval(&self, statement: &str) -> Result<(), EngineError> {
        self.call(&script::eval(statement)).map(drop)
    }

    fn read_variable(&self, name: &str) -> Result<Option<EngineValue>, EngineError> {
        if !script::is_identifier(name) {
            tracing::debug!(variable = name, "Not a valid identifier, treating as absent");
            return Ok(None);
        }
        let reply = self.call(&script::read_variable(name))?;
        parse_variable(&reply)
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        let conn = self.conn.get_mut().unwrap_or_else(PoisonError::into_inner);
        let _ = conn.stdin.write_all(b"exit\n");
        if let Err(e) = conn.child.kill() {
            tracing::debug!("Failed to kill engine process group: {e}");
        }
        let _ = conn.child.wait();
        tracing::info!(session = %self.name, "MATLAB session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable_is_command_error() {
        let config = EngineConfig::new("definitely-not-an-engine-binary-7f3a -nodesktop");
        let err = ProcessEngine::connect(&config).err().unwrap();
        assert!(matches!(err, ConnectError::Command(CommandBuildError::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_exited_process_is_communication_error() {
        // `true` exits immediately without answering the handshake.
        let Some(path) = crate::command::resolve_executable_path("true") else {
            return;
        };
        let config = EngineConfig::new(path.to_string_lossy().into_owned());
        let err = ProcessEngine::connect(&config).err().unwrap();
        assert!(matches!(
            err,
            ConnectError::Handshake(EngineError::Communication(_))
        ));
    }

    /// A stand-in REPL answering each framed block the way the engine would.
    #[cfg(unix)]
    const FAKE_REPL: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *"'<<<MCP:"*":BEGIN>>>'"*)
      id=${line#*<<<MCP:}; id=${id%%:BEGIN*}; body="" ;;
    "end, clear "*)
      case "$body" in
        *quit_engine*) exit 0 ;;
        *"exist("*) printf '<<<MCP:%s:BEGIN>>>\nABSENT\n\n<<<MCP:%s:OK>>>\n' "$id" "$id" ;;
        *"error("*) printf '<<<MCP:%s:BEGIN>>>\npartial\n\n<<<MCP:%s:ERR>>>\nboom\n<<<MCP:%s:END>>>\n' "$id" "$id" "$id" ;;
        *) printf 'noise\n<<<MCP:%s:BEGIN>>>\nhello\n\n<<<MCP:%s:OK>>>\n' "$id" "$id" ;;
      esac ;;
    *) body="$body$line" ;;
  esac
done
"#;

    #[cfg(unix)]
    fn fake_engine(dir: &tempfile::TempDir) -> ProcessEngine {
        let script = dir.path().join("repl.sh");
        std::fs::write(&script, FAKE_REPL).unwrap();
        let config =
            EngineConfig::new("sh").with_args([script.to_string_lossy().into_owned()]);
        ProcessEngine::connect(&config).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_framed_calls_through_child_process() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(&dir);

        assert_eq!(engine.eval_capture("disp(1)").unwrap(), "hello\n");
        assert_eq!(engine.eval("x = 1;"), Ok(()));
        assert_eq!(engine.read_variable("x").unwrap(), None);
        assert_eq!(
            engine.eval("error('boom')"),
            Err(EngineError::Execution("boom".into()))
        );
        // A script error leaves the connection usable.
        assert_eq!(engine.eval_capture("disp(2)").unwrap(), "hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_connection_stays_closed_after_engine_exits() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(&dir);

        assert!(matches!(
            engine.eval("quit_engine"),
            Err(EngineError::Communication(_))
        ));
        let Err(EngineError::Communication(reason)) = engine.eval_capture("disp(1)") else {
            panic!("expected communication error");
        };
        assert!(reason.starts_with("engine session is closed"));
    }
}
