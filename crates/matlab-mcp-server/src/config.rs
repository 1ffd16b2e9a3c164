//! Command-line and environment configuration.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, ValueEnum};
use matlab_mcp_engine::{DEFAULT_ENGINE_COMMAND, EngineConfig};

/// How the server talks to its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    Stdio,
    /// JSON-RPC over HTTP POST (requires the `http` feature).
    Http,
}

/// MCP server exposing a shared MATLAB session.
#[derive(Debug, Clone, Parser)]
#[command(name = "matlab-mcp", version, about)]
pub struct Args {
    /// Command line that starts the MATLAB engine.
    #[arg(long = "engine", env = "MATLAB_MCP_ENGINE", default_value = DEFAULT_ENGINE_COMMAND)]
    pub engine_command: String,

    /// Extra engine argument, passed through unsplit. Repeatable.
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Directory for the transient script file.
    #[arg(long, env = "MATLAB_MCP_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    pub transport: Transport,

    /// Listen address for the HTTP transport.
    #[arg(long, default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Keep serving without a session; every tool call reports NoSession.
    #[arg(long)]
    pub allow_missing_engine: bool,
}

impl Args {
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let config =
            EngineConfig::new(self.engine_command.as_str()).with_args(self.engine_args.clone());
        match &self.artifact_dir {
            Some(dir) => config.with_artifact_dir(dir),
            None => config,
        }
    }
}
