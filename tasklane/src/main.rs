//! Tasklane command-line board.
//!
//! Talks to a running `tasklane-server`. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/tasklane/config.toml`).
//!
//! ```bash
//! cargo run --bin tasklane -- add "write report" --status next --priority 2
//! cargo run --bin tasklane -- move 7 --before 3
//! cargo run --bin tasklane -- status 7 ongoing
//! TASKLANE_URL=http://10.0.0.2:3000 cargo run --bin tasklane -- list
//! ```

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tasklane::api::{ClientError, HttpTaskApi};
use tasklane::board::{Board, BoardWarning};
use tasklane::config::{CliArgs, ClientConfig, Command, SubCommand};
use tasklane_proto::task::{Priority, Subtask, Task, TaskStatus};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file so stdout carries only command output.
    let _log_guard = init_logging(&config.log_level, &config.log_file);

    let api = match HttpTaskApi::new(&config.server_url, config.request_timeout) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let (board, mut warnings) = Board::new(api, &config.board_config());
    let command = cli.command.unwrap_or(Command::List {
        status: None,
        all: false,
    });
    tracing::info!(server = %config.server_url, ?command, "running command");

    let result = run(&board, command).await;
    board.settle().await;

    let warned = report_warnings(&mut warnings);
    match result {
        Ok(()) if !warned => ExitCode::SUCCESS,
        Ok(()) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until exit so buffered log
/// entries are flushed.
fn init_logging(level: &str, log_path: &Path) -> Option<WorkerGuard> {
    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

fn parse_priority(raw: Option<i64>) -> Result<Option<Priority>, String> {
    raw.map(Priority::new).transpose().map_err(|e| e.to_string())
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("{0}")]
    Usage(String),
}

async fn run(board: &Board<HttpTaskApi>, command: Command) -> Result<(), CliError> {
    match command {
        Command::List { status, all } => {
            board.reload().await?;
            let statuses: Vec<TaskStatus> = status.map_or_else(|| TaskStatus::ALL.to_vec(), |s| vec![s]);
            for status in statuses {
                print_column(status, &board.column(status));
            }
            if all {
                print_column_named("deleted", &board.trash());
            }
        }
        Command::Add {
            title,
            status,
            priority: raw,
        } => {
            let priority = parse_priority(raw).map_err(CliError::Usage)?;
            let task = board.create_task(&title, status, priority).await?;
            println!("created {}", task_line(&task));
        }
        Command::Edit {
            id,
            title,
            priority: raw,
        } => {
            let priority = parse_priority(raw).map_err(CliError::Usage)?;
            let task = board.update_task(id, title.as_deref(), priority).await?;
            println!("updated {}", task_line(&task));
        }
        Command::Move { id, before } => {
            board.reload().await?;
            if board.task(id).is_none() {
                return Err(CliError::Usage(format!("task {id} not found")));
            }
            if board.move_task(id, before) {
                board.settle().await;
                if let Some(task) = board.task(id) {
                    print_column(task.status, &board.column(task.status));
                }
            } else {
                println!("order unchanged");
            }
        }
        Command::Status { id, status } => {
            board.reload().await?;
            let task = board.change_status(id, status).await?;
            println!("moved {}", task_line(&task));
        }
        Command::Delete { id } => {
            let task = board.delete_task(id).await?;
            println!("deleted {}", task_line(&task));
        }
        Command::Restore { id } => {
            let task = board.restore_task(id).await?;
            println!("restored {}", task_line(&task));
        }
        Command::Purge { id } => {
            board.purge_task(id).await?;
            println!("purged task {id}");
        }
        Command::Sub(sub) => run_sub(board, sub).await?,
    }
    Ok(())
}

async fn run_sub(board: &Board<HttpTaskApi>, command: SubCommand) -> Result<(), CliError> {
    match command {
        SubCommand::List { task_id } => {
            board.load_subtasks(task_id).await?;
            print_subtasks(task_id, &board.subtasks(task_id));
        }
        SubCommand::Add { task_id, title } => {
            let subtask = board.create_subtask(task_id, &title).await?;
            println!("created {}", subtask_line(&subtask));
        }
        SubCommand::Move {
            task_id,
            id,
            before,
        } => {
            board.load_subtasks(task_id).await?;
            if board.move_subtask(id, before) {
                board.settle().await;
                print_subtasks(task_id, &board.subtasks(task_id));
            } else {
                println!("order unchanged");
            }
        }
        SubCommand::Delete { task_id, id } => {
            board.load_subtasks(task_id).await?;
            let subtask = board.delete_subtask(id).await?;
            println!("deleted {}", subtask_line(&subtask));
        }
        SubCommand::Restore { task_id, id } => {
            board.load_subtasks(task_id).await?;
            let subtask = board.restore_subtask(id).await?;
            println!("restored {}", subtask_line(&subtask));
        }
        SubCommand::Purge { task_id, id } => {
            board.load_subtasks(task_id).await?;
            board.purge_subtask(id).await?;
            println!("purged subtask {id}");
        }
    }
    Ok(())
}

fn task_line(task: &Task) -> String {
    let key = task
        .sort_index
        .map_or_else(|| "-".to_string(), |k| k.to_string());
    format!("#{:<4} {} [{key:>5}] {}", task.id, task.priority, task.title)
}

fn subtask_line(subtask: &Subtask) -> String {
    format!("#{:<4} {}", subtask.id, subtask.title)
}

fn print_column(status: TaskStatus, tasks: &[Task]) {
    print_column_named(status.as_str(), tasks);
}

fn print_column_named(name: &str, tasks: &[Task]) {
    if tasks.is_empty() {
        return;
    }
    println!("{name} ({})", tasks.len());
    for task in tasks {
        println!("  {}", task_line(task));
    }
}

fn print_subtasks(task_id: i64, subtasks: &[Subtask]) {
    println!("subtasks of #{task_id} ({})", subtasks.len());
    for subtask in subtasks {
        println!("  {}", subtask_line(subtask));
    }
}

/// Prints queued warnings to stderr. Returns whether there were any.
fn report_warnings(rx: &mut mpsc::Receiver<BoardWarning>) -> bool {
    let mut any = false;
    while let Ok(warning) = rx.try_recv() {
        eprintln!("Warning: {warning}");
        any = true;
    }
    any
}
