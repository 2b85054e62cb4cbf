#![forbid(unsafe_code)]

//! `cody-agent-ctl`: headless client for `cody-agent`.
//!
//! Spawns the agent, performs the handshake, runs one command, and always
//! finishes with `shutdown` then `exit`. Editor and intent queries from the
//! agent are answered by a local editor with nothing open.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use cody_agent::client::{spawn_agent, wait_for_exit, ClientSession, SpawnConfig};
use cody_agent::editor::NoopEditor;
use cody_agent::intent::StaticIntentDetector;
use cody_agent::protocol::{ExecuteRecipeParams, StaticEditor, StaticRecipeContext};
use cody_agent::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "cody-agent-ctl",
    about = "Headless client for cody-agent",
    version,
    long_about = None
)]
struct Cli {
    /// Agent binary; defaults to `cody-agent` next to this executable.
    #[arg(long)]
    agent: Option<PathBuf>,

    /// Configuration file passed through to the agent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workspace root reported to recipes.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Seconds to wait for any single response; 0 waits indefinitely.
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the agent's recipes.
    List,

    /// Execute a recipe and print the assistant's answer.
    Execute {
        /// Recipe id (see `list`).
        recipe: String,
        /// Chat input for the recipe.
        input: String,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to build tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    let program = match args.agent {
        Some(path) => path,
        None => default_agent_path()?,
    };
    let mut spawn = SpawnConfig::new(program);
    if let Some(config) = &args.config {
        spawn.args.push("--config".into());
        spawn.args.push(config.to_string_lossy().into_owned());
    }
    if let Some(workspace) = &args.workspace {
        spawn.args.push("--workspace".into());
        spawn.args.push(workspace.to_string_lossy().into_owned());
    }

    let mut process = spawn_agent(&spawn)?;
    let workspace_root = args
        .workspace
        .as_ref()
        .map(|ws| ws.to_string_lossy().into_owned());
    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));

    let session = ClientSession::start(
        process.stdout,
        process.stdin,
        Arc::new(NoopEditor::new(workspace_root.clone())),
        Arc::new(StaticIntentDetector::default()),
        timeout,
    )?;

    let server = session.initialize("cody-agent-ctl").await?;
    info!(server = %server.name, "handshake complete");

    let outcome = execute_command(&session, args.command, workspace_root).await;

    let end = session.shutdown_and_exit().await;
    let code = wait_for_exit(&mut process.child, Duration::from_secs(5)).await?;
    match &end {
        Ok(end) => info!(?end, ?code, "agent session finished"),
        Err(err) => warn!(%err, ?code, "agent did not shut down cleanly"),
    }

    outcome?;
    end.map(|_| ())
}

async fn execute_command(
    session: &ClientSession,
    command: Command,
    workspace_root: Option<String>,
) -> Result<()> {
    match command {
        Command::List => {
            for recipe in session.list_recipes().await? {
                println!("{}\t{}", recipe.id, recipe.title);
            }
        }
        Command::Execute { recipe, input } => {
            let params = ExecuteRecipeParams {
                id: recipe,
                human_chat_input: input,
                context: Some(StaticRecipeContext {
                    editor: StaticEditor { workspace_root },
                    first_interaction: true,
                }),
            };
            session.execute_recipe(&params).await?;

            let answer = session
                .transcript()
                .await
                .and_then(|t| t.interactions.last().map(|i| i.assistant_message.text.clone()))
                .ok_or_else(|| AppError::Protocol("agent sent no transcript".into()))?;
            println!("{answer}");
        }
    }
    Ok(())
}

fn default_agent_path() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|err| AppError::Config(format!("cannot locate current executable: {err}")))?;
    let dir = exe
        .parent()
        .ok_or_else(|| AppError::Config("current executable has no parent directory".into()))?;
    Ok(dir.join(format!("cody-agent{}", std::env::consts::EXE_SUFFIX)))
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
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
