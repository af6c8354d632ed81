//! Process logging bootstrap and safety policy.
//!
//! # Responsibility
//! - Initialize console logging, optionally mirrored to rolling files,
//!   exactly once per process.
//! - Emit stable, metadata-only diagnostic events from core.
//!
//! # Invariants
//! - Logging init is idempotent for the same configuration.
//! - Logging initialization must not panic.
//! - Re-initialization with a different configuration is rejected.
//! - Logging never replaces error returns.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_TO_FILE: &str = "LOG_TO_FILE";
pub const ENV_LOG_FILE_PATH: &str = "LOG_FILE_PATH";
pub const DEFAULT_LOG_FILE_PATH: &str = "/var/log/todolist/app.log";

const DEFAULT_LOG_BASENAME: &str = "todolist";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    log_file: Option<PathBuf>,
    _logger: LoggerHandle,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unsupported log level `{0}`; expected trace|debug|info|warn|error")]
    UnsupportedLevel(String),
    #[error("failed to create log directory `{}`: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start logger: {0}")]
    Backend(#[from] flexi_logger::FlexiLoggerError),
    #[error("logging already initialized with {active}; refusing to switch to {requested}")]
    Conflict { active: String, requested: String },
}

/// Logging settings resolved by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    /// When set, logs are also written to this file with size rotation.
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            log_file: None,
        }
    }
}

impl LogConfig {
    /// Reads `LOG_LEVEL`, `LOG_TO_FILE`, `LOG_FILE_PATH` through `lookup`.
    ///
    /// An unknown level falls back to `info`.
    pub fn from_env_map(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let level = lookup(ENV_LOG_LEVEL)
            .and_then(|value| normalize_level(&value).ok())
            .unwrap_or("info");
        let log_to_file = lookup(ENV_LOG_TO_FILE)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));
        let log_file = log_to_file.then(|| {
            lookup(ENV_LOG_FILE_PATH)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE_PATH))
        });

        Self {
            level: level.to_string(),
            log_file,
        }
    }
}

/// Initializes logging for the process.
///
/// # Invariants
/// - Calling this function repeatedly with the same config is idempotent.
/// - A different level or file after the first success is rejected.
/// - Initialization never panics.
///
/// # Errors
/// - `UnsupportedLevel` for unknown levels.
/// - `CreateDir` when the log file directory cannot be created.
/// - `Backend` when logger setup fails.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let level = normalize_level(&config.level)?;

    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, LoggingError> {
        let logger = Logger::try_with_str(level)?.format(flexi_logger::detailed_format);

        let handle = match &config.log_file {
            Some(path) => {
                let spec = file_spec(path)?;
                logger
                    .log_to_file(spec)
                    .duplicate_to_stderr(Duplicate::All)
                    .rotate(
                        Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                        Naming::Numbers,
                        Cleanup::KeepLogFiles(MAX_LOG_FILES),
                    )
                    .write_mode(WriteMode::BufferAndFlush)
                    .append()
                    .start()?
            }
            None => logger.log_to_stderr().start()?,
        };

        install_panic_hook_once();

        info!(
            "event=app_start module=core status=ok platform={} version={}",
            std::env::consts::OS,
            env!("CARGO_PKG_VERSION")
        );
        info!(
            "event=logging_init module=core status=ok level={} to_file={}",
            level,
            config.log_file.is_some()
        );

        Ok(LoggingState {
            level,
            log_file: config.log_file.clone(),
            _logger: handle,
        })
    })?;

    if state.level != level || state.log_file != config.log_file {
        return Err(LoggingError::Conflict {
            active: describe(state.level, state.log_file.as_deref()),
            requested: describe(level, config.log_file.as_deref()),
        });
    }

    Ok(())
}

/// Returns `(level, log_file)` when logging is active.
pub fn logging_status() -> Option<(&'static str, Option<PathBuf>)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.log_file.clone()))
}

/// Returns the default log level for the current build mode.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" | "critical" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn file_spec(path: &Path) -> Result<FileSpec, LoggingError> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(directory).map_err(|source| LoggingError::CreateDir {
        path: directory.to_path_buf(),
        source,
    })?;

    let basename = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(DEFAULT_LOG_BASENAME);
    let mut spec = FileSpec::default()
        .directory(directory)
        .basename(basename)
        .suppress_timestamp();
    if let Some(suffix) = path.extension().and_then(|ext| ext.to_str()) {
        spec = spec.suffix(suffix);
    }
    Ok(spec)
}

fn describe(level: &str, log_file: Option<&Path>) -> String {
    match log_file {
        Some(path) => format!("level `{level}` file `{}`", path.display()),
        None => format!("level `{level}` console only"),
    }
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.get().is_some() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Panic payloads can carry task titles; cap and flatten them.
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_summary(panic_info);
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location, payload
        );
        previous_hook(panic_info);
    }));

    let _ = PANIC_HOOK_INSTALLED.set(());
}

fn panic_payload_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };

    sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, logging_status, normalize_level, sanitize_message, LogConfig,
        LoggingError, DEFAULT_LOG_FILE_PATH,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn normalize_level_accepts_known_values_and_aliases() {
        assert_eq!(normalize_level("INFO").unwrap(), "info");
        assert_eq!(normalize_level(" warning ").unwrap(), "warn");
        assert_eq!(normalize_level("CRITICAL").unwrap(), "error");
        assert!(matches!(
            normalize_level("loud"),
            Err(LoggingError::UnsupportedLevel(_))
        ));
    }

    #[test]
    fn config_from_env_falls_back_to_info_and_console() {
        let vars = env(&[("LOG_LEVEL", "verbose")]);
        let config = LogConfig::from_env_map(|key| vars.get(key).cloned());
        assert_eq!(config.level, "info");
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn config_from_env_enables_file_with_default_path() {
        let vars = env(&[("LOG_LEVEL", "debug"), ("LOG_TO_FILE", "TRUE")]);
        let config = LogConfig::from_env_map(|key| vars.get(key).cloned());
        assert_eq!(config.level, "debug");
        assert_eq!(config.log_file, Some(PathBuf::from(DEFAULT_LOG_FILE_PATH)));
    }

    #[test]
    fn sanitize_message_removes_newlines_and_truncates() {
        let sanitized = sanitize_message("line1\nline2\rline3", 8);
        assert!(!sanitized.contains('\n'));
        assert!(!sanitized.contains('\r'));
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn init_logging_is_idempotent_for_same_config_and_rejects_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            level: "info".to_string(),
            log_file: Some(dir.path().join("app.log")),
        };

        init_logging(&config).expect("first init should succeed");
        init_logging(&config).expect("same config should be idempotent");

        let level_error = init_logging(&LogConfig {
            level: "debug".to_string(),
            ..config.clone()
        })
        .expect_err("level conflict should fail");
        assert!(level_error.to_string().contains("refusing to switch"));

        let file_error = init_logging(&LogConfig {
            level: "info".to_string(),
            log_file: None,
        })
        .expect_err("destination conflict should fail");
        assert!(file_error.to_string().contains("refusing to switch"));

        let (active_level, active_file) = logging_status().expect("logging should be active");
        assert_eq!(active_level, "info");
        assert_eq!(active_file, config.log_file);
    }
}
