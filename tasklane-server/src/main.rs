//! Tasklane server: HTTP API over a single SQLite file.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:3000
//! cargo run --bin tasklane-server
//!
//! # Custom address and database
//! cargo run --bin tasklane-server -- --bind 0.0.0.0:8080 --database ./tasks.db
//!
//! # Or via environment variables
//! TASKLANE_ADDR=0.0.0.0:8080 TASKLANE_DB=./tasks.db cargo run --bin tasklane-server
//! ```

use std::sync::Arc;

use clap::Parser;
use tasklane_server::config::{ServerCliArgs, ServerConfig};
use tasklane_server::routes::{self, AppState};
use tasklane_server::store::TaskStore;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Some(parent) = config.database_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        tracing::error!(path = %parent.display(), error = %e, "failed to create data directory");
        std::process::exit(1);
    }

    let store = match TaskStore::open(&config.database_path) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(path = %config.database_path.display(), error = %e, "failed to open database");
            std::process::exit(1);
        }
    };
    tracing::info!(
        addr = %config.bind_addr,
        database = %config.database_path.display(),
        "starting tasklane server"
    );

    let state = Arc::new(AppState::new(store));

    match routes::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "tasklane server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
