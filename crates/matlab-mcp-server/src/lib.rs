//! MCP tool server for a shared MATLAB session.
//!
//! Provides:
//! - `McpServer` - JSON-RPC dispatch for `initialize`, `tools/list` and `tools/call`
//! - `ToolRegistry` - The `runCode` and `getVariable` tools
//! - Stdio transport, plus HTTP behind the `http` feature

pub mod config;
#[cfg(feature = "http")]
pub mod http;
pub mod protocol;
pub mod server;
pub mod tools;

pub use config::{Args, Transport};
pub use server::{McpServer, ProtocolError, serve, serve_stdio};
pub use tools::{Tool, ToolError, ToolRegistry};
