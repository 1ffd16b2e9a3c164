//! Request dispatch and the stdio serve loop.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter},
    sync::Mutex,
    task::JoinSet,
};

use crate::{
    protocol::{
        CallToolParams, CallToolResult, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
        IncomingMessage, Implementation, InitializeResult, JSONRPC_VERSION, ListToolsResult,
        METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION, RequestId, Response, RpcError,
    },
    tools::{ToolError, ToolRegistry},
};

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// MCP request handler over a tool registry.
pub struct McpServer {
    registry: ToolRegistry,
    instructions: Option<String>,
}

impl McpServer {
    #[must_use]
    pub const fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            instructions: None,
        }
    }

    /// Text returned to the client on initialize.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Handle one raw JSON-RPC message.
    ///
    /// Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Invalid JSON from client: {e}");
                return Some(Response::error(
                    None,
                    RpcError::new(PARSE_ERROR, format!("Parse error: {e}")),
                ));
            }
        };

        let id = value
            .get("id")
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
        match serde_json::from_value::<IncomingMessage>(value) {
            Ok(message) => self.handle(message).await,
            Err(e) => Some(Response::error(
                id,
                RpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
            )),
        }
    }

    /// Handle one decoded message.
    pub async fn handle(&self, message: IncomingMessage) -> Option<Response> {
        let Some(id) = message.id else {
            tracing::debug!(method = %message.method, "Notification received");
            return None;
        };

        if message.jsonrpc != JSONRPC_VERSION {
            return Some(Response::error(
                Some(id),
                RpcError::new(
                    INVALID_REQUEST,
                    format!("Unsupported jsonrpc version {}", message.jsonrpc),
                ),
            ));
        }

        tracing::debug!(method = %message.method, ?id, "Request received");
        let result = match message.method.as_str() {
            "initialize" => self.initialize(),
            "ping" => Ok(json!({})),
            "tools/list" => to_result(&ListToolsResult {
                tools: self.registry.descriptors(),
            }),
            "tools/call" => self.call_tool(message.params).await,
            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        };

        Some(match result {
            Ok(value) => Response::result(Some(id), value),
            Err(error) => Response::error(Some(id), error),
        })
    }

    fn initialize(&self) -> Result<Value, RpcError> {
        to_result(&InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({ "tools": {} }),
            server_info: Implementation {
                name: "matlab-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: self.instructions.clone(),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| RpcError::new(INVALID_PARAMS, format!("Invalid params: {e}")))?;

        match self.registry.call(&params.name, params.arguments).await {
            Ok(reply) => to_result(&CallToolResult::from_response(reply.body, reply.is_error)),
            Err(e @ (ToolError::UnknownTool(_) | ToolError::InvalidArguments(_))) => {
                Err(RpcError::new(INVALID_PARAMS, e.to_string()))
            }
            Err(e @ ToolError::Encode(_)) => Err(RpcError::new(INTERNAL_ERROR, e.to_string())),
        }
    }
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
}

/// Newline-delimited JSON writer shared by request tasks.
#[derive(Clone)]
pub struct ResponseWriter {
    writer: Arc<Mutex<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>>,
}

impl ResponseWriter {
    #[must_use]
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(BufWriter::new(Box::new(writer)))),
        }
    }

    /// Write one message as a line.
    ///
    /// # Errors
    /// Returns error if encoding or the write fails.
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<(), ProtocolError> {
        let json = serde_json::to_string(message)?;
        let mut guard = self.writer.lock().await;
        guard.write_all(json.as_bytes()).await?;
        guard.write_all(b"\n").await?;
        guard.flush().await?;
        Ok(())
    }
}

/// Serve newline-delimited JSON-RPC until `reader` reaches EOF.
///
/// Each request runs in its own task so a long engine call does not stop
/// later requests from being read. Outstanding requests finish before this
/// returns.
///
/// # Errors
/// Returns error if reading the input fails.
pub async fn serve<R, W>(server: Arc<McpServer>, reader: R, writer: W) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let writer = ResponseWriter::new(writer);
    let mut lines = BufReader::new(reader).lines();
    let mut in_flight = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let server = Arc::clone(&server);
        let writer = writer.clone();
        in_flight.spawn(async move {
            if let Some(response) = server.handle_line(&line).await {
                if let Err(e) = writer.send(&response).await {
                    tracing::error!("Failed to send response: {e}");
                }
            }
        });
        while in_flight.try_join_next().is_some() {}
    }

    tracing::info!("Client closed input, waiting for {} request(s)", in_flight.len());
    while in_flight.join_next().await.is_some() {}
    Ok(())
}

/// Serve over the process's stdin/stdout.
///
/// # Errors
/// Returns error if reading stdin fails.
pub async fn serve_stdio(server: Arc<McpServer>) -> Result<(), ProtocolError> {
    serve(server, tokio::io::stdin(), tokio::io::stdout()).await
}
