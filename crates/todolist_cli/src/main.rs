//! `todo` command-line adapter.
//!
//! # Responsibility
//! - Resolve backend and logging settings from flags over environment.
//! - Hand one ready service to the command runner.
//!
//! # Invariants
//! - Flags win over environment variables; environment wins over defaults.
//! - A missing task exits with status 1.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;
use todolist_core::config::{ENV_BACKEND, ENV_SQLITE_DB_PATH, ENV_TABLE_NAME};
use todolist_core::logging::{ENV_LOG_FILE_PATH, ENV_LOG_LEVEL, ENV_LOG_TO_FILE};
use todolist_core::{init_logging, open_service, BackendConfig, ConfigError, LogConfig};

mod commands;

use commands::Outcome;

const DEFAULT_DB_FILE_NAME: &str = ".todolist.db";
const CLI_DEFAULT_LOG_LEVEL: &str = "warn";

/// Todo list stored in SQLite or Azure Table storage.
#[derive(Parser, Debug)]
#[command(name = "todo", version, about = "Manage todo items from the terminal")]
struct Cli {
    /// Storage backend (defaults to TODO_BACKEND, then sqlite).
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// SQLite database file (defaults to SQLITE_DB_PATH, then ~/.todolist.db).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Azure table name (defaults to AZURE_TABLE_NAME, then todos).
    #[arg(long)]
    azure_table: Option<String>,

    #[arg(
        long,
        ignore_case = true,
        value_parser = ["trace", "debug", "info", "warn", "warning", "error", "critical"]
    )]
    log_level: Option<String>,

    /// Mirror logs to a rotating file.
    #[arg(long)]
    log_to_file: bool,

    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print tasks as JSON objects.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Sqlite,
    Azure,
}

impl BackendArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Azure => "azure",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all tasks.
    List,

    /// Add a new task.
    Add {
        title: String,
        #[arg(long)]
        completed: bool,
    },

    /// Mark a task as completed.
    Complete { task_id: String },

    /// Toggle a task's completion status.
    Toggle { task_id: String },

    /// Change a task's title and/or completion flag.
    #[command(group(
        ArgGroup::new("fields")
            .required(true)
            .multiple(true)
            .args(["title", "completed"])
    ))]
    Update {
        task_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        completed: Option<bool>,
    },

    /// Show one task with its timestamps.
    Show { task_id: String },

    /// Delete a task.
    Delete { task_id: String },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let env = |key: &str| std::env::var(key).ok();

    init_logging(&log_config(&cli, env)).context("failed to initialize logging")?;
    let config = backend_config(&cli, env).context("invalid backend configuration")?;
    info!(
        "event=cli_start module=cli status=ok backend={}",
        config.label()
    );

    let service = open_service(&config)
        .with_context(|| format!("failed to open {} backend", config.label()))?;
    let stdout = std::io::stdout();
    let outcome = commands::run(cli.cmd, &service, cli.json, &mut stdout.lock())?;

    Ok(match outcome {
        Outcome::Done => ExitCode::SUCCESS,
        Outcome::NotFound => ExitCode::FAILURE,
    })
}

fn backend_config(
    cli: &Cli,
    env: impl Fn(&str) -> Option<String>,
) -> Result<BackendConfig, ConfigError> {
    BackendConfig::from_env_map(|key| match key {
        ENV_BACKEND => cli
            .backend
            .map(|backend| backend.as_str().to_string())
            .or_else(|| env(key)),
        ENV_SQLITE_DB_PATH => cli
            .db_path
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned())
            .or_else(|| env(key))
            .or_else(default_db_path),
        ENV_TABLE_NAME => cli.azure_table.clone().or_else(|| env(key)),
        _ => env(key),
    })
}

fn log_config(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> LogConfig {
    LogConfig::from_env_map(|key| match key {
        ENV_LOG_LEVEL => cli
            .log_level
            .clone()
            .or_else(|| env(key))
            .or_else(|| Some(CLI_DEFAULT_LOG_LEVEL.to_string())),
        ENV_LOG_TO_FILE => cli
            .log_to_file
            .then(|| "true".to_string())
            .or_else(|| env(key)),
        ENV_LOG_FILE_PATH => cli
            .log_file
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned())
            .or_else(|| env(key)),
        _ => env(key),
    })
}

fn default_db_path() -> Option<String> {
    dirs::home_dir().map(|home| home.join(DEFAULT_DB_FILE_NAME).to_string_lossy().into_owned())
}
