//! Agent process spawner.
//!
//! Launches the `cody-agent` binary with:
//! - `kill_on_drop(true)` so an abandoned child never outlives its client.
//! - `env_clear()` plus an allowlist, so only the variables the agent needs
//!   (and the Sourcegraph settings) reach the child.
//! - piped stdin/stdout for the protocol and inherited stderr for its logs.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{info, warn};

use crate::config::{ENV_ACCESS_TOKEN, ENV_ENDPOINT, ENV_REQUEST_TIMEOUT};
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the spawned agent process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    ENV_ACCESS_TOKEN,
    ENV_ENDPOINT,
    ENV_REQUEST_TIMEOUT,
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

// ── Configuration ────────────────────────────────────────────────────────────

/// How to launch the agent.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Agent binary.
    pub program: PathBuf,
    /// Arguments passed to the agent (e.g. `--config <path>`).
    pub args: Vec<String>,
    /// Working directory; inherited when `None`.
    pub working_dir: Option<PathBuf>,
}

impl SpawnConfig {
    /// Launch `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

/// Running agent process with its protocol pipes.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child handle; dropping it kills the agent.
    pub child: Child,
    /// Agent's stdin (client → agent frames).
    pub stdin: ChildStdin,
    /// Agent's stdout (agent → client frames).
    pub stdout: ChildStdout,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn the agent process.
///
/// # Errors
///
/// - `AppError::Io("failed to spawn agent: …")`: OS spawn failure.
/// - `AppError::Io("failed to capture agent stdin/stdout")`: missing pipe.
pub fn spawn_agent(config: &SpawnConfig) -> Result<AgentProcess> {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args);

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Io(format!(
            "failed to spawn agent {}: {err}",
            config.program.display()
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Io("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Io("failed to capture agent stdout".into()))?;

    info!(program = %config.program.display(), pid = child.id(), "agent process spawned");
    Ok(AgentProcess {
        child,
        stdin,
        stdout,
    })
}

// ── Exit ─────────────────────────────────────────────────────────────────────

/// Wait up to `grace` for the agent to exit, killing it afterwards.
///
/// Returns the exit code, or `None` when the process ended by signal or had
/// to be killed.
///
/// # Errors
///
/// Returns `AppError::Io` if waiting on the process fails.
pub async fn wait_for_exit(child: &mut Child, grace: Duration) -> Result<Option<i32>> {
    if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
        let status = status.map_err(|err| AppError::Io(format!("wait error: {err}")))?;
        info!(code = ?status.code(), "agent process exited");
        return Ok(status.code());
    }

    warn!(?grace, "agent did not exit in time, killing it");
    child
        .kill()
        .await
        .map_err(|err| AppError::Io(format!("failed to kill agent: {err}")))?;
    Ok(None)
}
