//! Tracing setup shared by the server and the CLI.
//!
//! Every pipeline run executes inside a `pipeline` span carrying its `trace_id`, so stage events
//! from one question can be grepped out of either sink. Stdout gets compact lines without
//! targets; the file sink keeps targets (`rustyrag::index::engine`, `rustyrag::api`, ...) and is
//! written off-thread. `RUSTYRAG_LOG_FILE` names the file to append to, otherwise
//! `logs/rustyrag.log` is used.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_DIR: &str = "logs";
const LOG_FILE_NAME: &str = "rustyrag.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` filters both sinks and defaults to `info`; use
/// `rustyrag=debug` to see chunk counts and derived index settings.
///
/// Calling it again is a no-op. When the log file cannot be opened only stdout is used.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let installed = if let Some(writer) = configure_file_writer() {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).try_init()
    } else {
        registry.try_init()
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn configure_file_writer() -> Option<NonBlocking> {
    if let Ok(path) = std::env::var("RUSTYRAG_LOG_FILE") {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                let _ = LOG_GUARD.set(guard);
                Some(non_blocking)
            }
            Err(err) => {
                eprintln!("Failed to open log file {path}: {err}");
                None
            }
        }
    } else {
        if let Err(err) = std::fs::create_dir_all(LOG_DIR) {
            eprintln!("Failed to create logs directory: {err}");
            return None;
        }
        let file_appender = tracing_appender::rolling::never(LOG_DIR, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);
        Some(non_blocking)
    }
}
