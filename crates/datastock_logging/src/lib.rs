//! Logging setup shared by Datastock binaries.
//!
//! Events go to a daily log file under `$DATASTOCK_HOME/logs` and to stderr.
//! The file writer runs on a background thread; keep the returned
//! [`LogGuard`] alive until exit so buffered lines are flushed.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "datastock=info,datastock_inventory=info";
const VERBOSE_LOG_FILTER: &str = "datastock=debug,datastock_inventory=debug";

pub struct LogConfig<'a> {
    /// Log file prefix; the appender adds the date suffix.
    pub app_name: &'a str,
    pub verbose: bool,
    /// Keep stderr to warnings, e.g. when stdout carries JSON.
    pub quiet: bool,
}

/// Flushes the file writer on drop. Empty when no log file could be opened.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    file: Option<WorkerGuard>,
}

impl LogGuard {
    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }
}

/// Install the global subscriber. A missing logs directory only costs the
/// file layer; stderr logging still comes up.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = match console_directives(config.verbose, config.quiet) {
        Some(directives) => EnvFilter::new(directives),
        None => file_filter.clone(),
    };

    let mut guard = None;
    let file_layer = match ensure_logs_dir() {
        Ok(dir) => {
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", file_prefix(config.app_name)));
            let (writer, worker) = tracing_appender::non_blocking(appender);
            guard = Some(worker);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        }
        Err(err) => {
            eprintln!("Warning: file logging disabled: {:#}", err);
            None
        }
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { file: guard })
}

/// Stderr directives overriding `RUST_LOG`, if any.
fn console_directives(verbose: bool, quiet: bool) -> Option<&'static str> {
    if verbose {
        Some(VERBOSE_LOG_FILTER)
    } else if quiet {
        Some("warn")
    } else {
        None
    }
}

fn file_prefix(app_name: &str) -> String {
    let prefix: String = app_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if prefix.is_empty() {
        "datastock".to_string()
    } else {
        prefix
    }
}

/// Datastock home: `$DATASTOCK_HOME`, else `~/.datastock`.
pub fn datastock_home() -> PathBuf {
    match std::env::var_os("DATASTOCK_HOME") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".datastock"),
    }
}

pub fn logs_dir() -> PathBuf {
    logs_dir_under(&datastock_home())
}

fn logs_dir_under(home: &Path) -> PathBuf {
    home.join("logs")
}

/// Create the logs directory if needed and return it.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    create_logs_dir(&datastock_home())
}

fn create_logs_dir(home: &Path) -> Result<PathBuf> {
    let logs = logs_dir_under(home);
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}
