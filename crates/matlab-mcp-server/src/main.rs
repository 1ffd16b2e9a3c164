use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use matlab_mcp_core::{Session, SessionCell};
use matlab_mcp_engine::ProcessEngine;
use matlab_mcp_server::{Args, McpServer, ToolRegistry, Transport, serve_stdio};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.engine_config();

    let session = Arc::new(SessionCell::empty());
    let connect_config = config.clone();
    match tokio::task::spawn_blocking(move || ProcessEngine::connect(&connect_config))
        .await
        .context("engine startup task failed")?
    {
        Ok(engine) => {
            let name = engine.name().to_string();
            session.attach(Session::new(name, Arc::new(engine)))?;
        }
        Err(e) if args.allow_missing_engine => {
            tracing::warn!("Starting without a MATLAB session: {e}");
        }
        Err(e) => return Err(e).context("failed to start MATLAB engine"),
    }

    let instructions = session.get().map_or_else(
        || "No MATLAB session is active; tool calls will report NoSession.".to_string(),
        |s| format!("Connected to MATLAB session {}.", s.name()),
    );
    let registry = ToolRegistry::matlab(&session, &config.artifact_dir);
    let server = Arc::new(McpServer::new(registry).with_instructions(instructions));

    match args.transport {
        Transport::Stdio => {
            tracing::info!("Serving MCP over stdio");
            serve_stdio(server).await?;
        }
        #[cfg(feature = "http")]
        Transport::Http => matlab_mcp_server::http::serve_http(server, args.bind).await?,
        #[cfg(not(feature = "http"))]
        Transport::Http => anyhow::bail!("HTTP transport requires the `http` feature"),
    }

    Ok(())
}
