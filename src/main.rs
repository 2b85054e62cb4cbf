#![forbid(unsafe_code)]

//! `cody-agent`: serves the agent protocol over stdin/stdout.
//!
//! Stdout carries protocol frames only; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use cody_agent::agent::{serve_connection, AgentServices};
use cody_agent::rpc::ConnectionEnd;
use cody_agent::{AgentConfig, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "cody-agent", about = "Cody agent JSON-RPC server", version, long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the workspace root reported to recipes.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("cody-agent bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    // ── Load configuration ──────────────────────────────
    let mut config = AgentConfig::load(args.config.as_deref())?;
    if let Some(ws) = args.workspace {
        config.workspace_root = Some(ws);
        config.validate()?;
    }
    info!(endpoint = %config.server_endpoint, "configuration loaded");

    // ── Serve stdio ─────────────────────────────────────
    let session = CancellationToken::new();
    let signal_session = session.clone();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("termination signal received, closing session");
        signal_session.cancel();
    });

    let outcome = serve_connection(
        config,
        AgentServices::default(),
        tokio::io::stdin(),
        tokio::io::stdout(),
        session,
    )
    .await?;
    signal_handle.abort();

    if let ConnectionEnd::Failed(err) = &outcome.end {
        error!(%err, "connection failed");
    }
    info!(exit_code = outcome.exit_code, "cody-agent stopped");
    Ok(ExitCode::from(u8::try_from(outcome.exit_code).unwrap_or(1)))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout is the protocol channel.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
