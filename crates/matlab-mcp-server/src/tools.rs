//! The `runCode` and `getVariable` tools.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use matlab_mcp_core::{
    ExecutionCoordinator, ExecutionOutcome, FailureKind, SessionCell, Stage, WorkspaceAccessor,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::protocol::ToolDescriptor;

/// Tool invocation error, reported as a JSON-RPC error rather than a tool
/// response.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),
    #[error("Failed to encode tool response: {0}")]
    Encode(serde_json::Error),
}

/// Response object of `runCode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunCodeResponse {
    Success {
        output: String,
        stage: Stage,
    },
    Error {
        message: String,
        error_type: FailureKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
    },
}

impl From<ExecutionOutcome> for RunCodeResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Success { stage, output } => Self::Success { output, stage },
            ExecutionOutcome::Failure(failure) => Self::Error {
                message: failure.message,
                error_type: failure.kind,
                stage: failure.stage,
            },
        }
    }
}

/// Response object of `getVariable`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VariableResponse {
    Success { value: Value },
    Error { message: String, error_type: FailureKind },
}

/// Structured tool result; `is_error` mirrors the `status` field.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    pub body: Value,
    pub is_error: bool,
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Invoke the tool. Engine-side failures are part of the reply, not
    /// errors.
    ///
    /// # Errors
    /// Returns error if the arguments do not match the input schema.
    async fn call(&self, arguments: Value) -> Result<ToolReply, ToolError>;
}

#[derive(Debug, Deserialize)]
struct RunCodeArgs {
    code: String,
}

#[derive(Debug, Deserialize)]
struct GetVariableArgs {
    name: String,
}

/// Runs MATLAB code through the execution fallback chain.
pub struct RunCodeTool {
    coordinator: ExecutionCoordinator,
}

impl RunCodeTool {
    #[must_use]
    pub const fn new(coordinator: ExecutionCoordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl Tool for RunCodeTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "runCode".to_string(),
            description: "Run MATLAB code in the shared MATLAB session. Console output is \
                          returned when the code is evaluated with output capture."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": {"type": "string", "description": "MATLAB statements to execute"}
                },
                "required": ["code"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<ToolReply, ToolError> {
        let args: RunCodeArgs = serde_json::from_value(arguments)?;
        tracing::info!(bytes = args.code.len(), "Running MATLAB code");

        let response = RunCodeResponse::from(self.coordinator.run(&args.code).await);
        let is_error = matches!(response, RunCodeResponse::Error { .. });
        Ok(ToolReply {
            body: serde_json::to_value(response).map_err(ToolError::Encode)?,
            is_error,
        })
    }
}

/// Reads a variable from the live workspace.
pub struct GetVariableTool {
    accessor: WorkspaceAccessor,
}

impl GetVariableTool {
    #[must_use]
    pub const fn new(accessor: WorkspaceAccessor) -> Self {
        Self { accessor }
    }
}

#[async_trait]
impl Tool for GetVariableTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "getVariable".to_string(),
            description: "Get the value of a variable from the MATLAB workspace.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Workspace variable name"}
                },
                "required": ["name"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<ToolReply, ToolError> {
        let args: GetVariableArgs = serde_json::from_value(arguments)?;
        tracing::info!(variable = %args.name, "Reading MATLAB variable");

        let response = match self.accessor.get_variable(&args.name).await {
            Ok(value) => VariableResponse::Success { value },
            Err(failure) => VariableResponse::Error {
                message: failure.message,
                error_type: failure.kind,
            },
        };
        let is_error = matches!(response, VariableResponse::Error { .. });
        Ok(ToolReply {
            body: serde_json::to_value(response).map_err(ToolError::Encode)?,
            is_error,
        })
    }
}

/// The set of tools served.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// `runCode` and `getVariable` sharing one session.
    #[must_use]
    pub fn matlab(session: &Arc<SessionCell>, artifact_dir: &Path) -> Self {
        let run_code: Arc<dyn Tool> = Arc::new(RunCodeTool::new(ExecutionCoordinator::new(
            Arc::clone(session),
            artifact_dir,
        )));
        let get_variable: Arc<dyn Tool> =
            Arc::new(GetVariableTool::new(WorkspaceAccessor::new(Arc::clone(session))));
        Self::new(vec![run_code, get_variable])
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    /// Invoke the tool called `name`.
    ///
    /// # Errors
    /// Returns error for an unknown tool or bad arguments.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<ToolReply, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.descriptor().name == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.call(arguments).await
    }
}
