//! Configuration system for the Tasklane client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tasklane/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use tasklane_proto::task::TaskStatus;

use crate::board::BoardConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    board: BoardFileConfig,
    log: LogFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    url: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// `[board]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    reorder_debounce_ms: Option<u64>,
    warning_buffer: Option<usize>,
}

/// `[log]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LogFileConfig {
    level: Option<String>,
    file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the task server.
    pub server_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Delay before each reorder send.
    pub reorder_debounce: Duration,
    /// Capacity of the board warning channel.
    pub warning_buffer: usize,
    /// Log level filter string.
    pub log_level: String,
    /// Log file path.
    pub log_file: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            request_timeout: Duration::from_secs(10),
            reorder_debounce: Duration::ZERO,
            warning_buffer: 32,
            log_level: "info".to_string(),
            log_file: std::env::temp_dir().join("tasklane.log"),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or any config file cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server_url: cli
                .server
                .clone()
                .or_else(|| file.server.url.clone())
                .unwrap_or(defaults.server_url),
            request_timeout: cli
                .timeout_secs
                .or(file.server.request_timeout_secs)
                .map_or(defaults.request_timeout, Duration::from_secs),
            reorder_debounce: file
                .board
                .reorder_debounce_ms
                .map_or(defaults.reorder_debounce, Duration::from_millis),
            warning_buffer: file
                .board
                .warning_buffer
                .unwrap_or(defaults.warning_buffer),
            log_level: cli
                .log_level
                .clone()
                .or_else(|| file.log.level.clone())
                .unwrap_or(defaults.log_level),
            log_file: cli
                .log_file
                .clone()
                .or_else(|| file.log.file.clone())
                .unwrap_or(defaults.log_file),
        }
    }

    /// Board tunables from this configuration.
    #[must_use]
    pub fn board_config(&self) -> BoardConfig {
        BoardConfig {
            reorder_debounce: self.reorder_debounce,
            warning_buffer: self.warning_buffer,
        }
    }
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Tasklane task board")]
pub struct CliArgs {
    /// Base URL of the task server.
    #[arg(long, env = "TASKLANE_URL")]
    pub server: Option<String>,

    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Path to config file (default: `~/.config/tasklane/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "TASKLANE_LOG")]
    pub log_level: Option<String>,

    /// Path to log file (default: `$TMPDIR/tasklane.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Command to run (default: `list`).
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Board commands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show tasks, grouped by status.
    List {
        /// Only this status.
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Include deleted tasks.
        #[arg(long)]
        all: bool,
    },
    /// Create a task at the top of its status.
    Add {
        /// Task title.
        title: String,
        /// Initial status.
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Priority, 1 (highest) to 5.
        #[arg(long)]
        priority: Option<i64>,
    },
    /// Edit a task's title or priority.
    Edit {
        /// Task id.
        id: i64,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New priority, 1 (highest) to 5.
        #[arg(long)]
        priority: Option<i64>,
    },
    /// Move a task within its status.
    Move {
        /// Task id.
        id: i64,
        /// Place before this task; omit to move to the end.
        #[arg(long)]
        before: Option<i64>,
    },
    /// Change a task's status.
    Status {
        /// Task id.
        id: i64,
        /// Destination status.
        status: TaskStatus,
    },
    /// Soft-delete a task.
    Delete {
        /// Task id.
        id: i64,
    },
    /// Restore a deleted task to the top of its status.
    Restore {
        /// Task id.
        id: i64,
    },
    /// Permanently delete a task and its subtasks.
    Purge {
        /// Task id.
        id: i64,
    },
    /// Subtask commands.
    #[command(subcommand)]
    Sub(SubCommand),
}

/// Subtask commands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SubCommand {
    /// Show a task's subtasks.
    List {
        /// Owning task id.
        task_id: i64,
    },
    /// Create a subtask at the top of its task.
    Add {
        /// Owning task id.
        task_id: i64,
        /// Subtask title.
        title: String,
    },
    /// Move a subtask within its task.
    Move {
        /// Owning task id.
        task_id: i64,
        /// Subtask id.
        id: i64,
        /// Place before this subtask; omit to move to the end.
        #[arg(long)]
        before: Option<i64>,
    },
    /// Soft-delete a subtask.
    Delete {
        /// Owning task id.
        task_id: i64,
        /// Subtask id.
        id: i64,
    },
    /// Restore a deleted subtask to the top of its task.
    Restore {
        /// Owning task id.
        task_id: i64,
        /// Subtask id.
        id: i64,
    },
    /// Permanently delete a subtask.
    Purge {
        /// Owning task id.
        task_id: i64,
        /// Subtask id.
        id: i64,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("tasklane").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
