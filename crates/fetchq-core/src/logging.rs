//! Logging init: file under the XDG state dir, or stderr when that fails.
//!
//! The filter comes from `FETCHQ_LOG`, then `RUST_LOG`, then a default that
//! keeps job lifecycle events at debug.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FETCHQ_LOG";
const DEFAULT_FILTER: &str = "info,fetchq_core=debug,fetchq=debug";

/// Per-event writer: a clone of the log file handle, or stderr if cloning failed.
enum LogSink {
    File(File),
    Stderr,
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::File(f) => f.write(buf),
            LogSink::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::File(f) => f.flush(),
            LogSink::Stderr => io::stderr().lock().flush(),
        }
    }
}

struct AppendLog(File);

impl<'a> MakeWriter<'a> for AppendLog {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        match self.0.try_clone() {
            Ok(f) => LogSink::File(f),
            Err(_) => LogSink::Stderr,
        }
    }
}

fn filter_directives(fetchq_log: Option<String>, rust_log: Option<String>) -> String {
    fetchq_log
        .or(rust_log)
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn env_filter() -> EnvFilter {
    let directives = filter_directives(std::env::var(LOG_ENV).ok(), std::env::var("RUST_LOG").ok());
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// `~/.local/state/fetchq/fetchq.log`.
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchq")?;
    Ok(xdg_dirs.get_state_home().join("fetchq.log"))
}

/// Install the subscriber, appending to [`log_file_path`]. Returns Err when the
/// file cannot be opened so the caller can fall back to [`init_logging_stderr`].
pub fn init_logging() -> Result<()> {
    let path = log_file_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(AppendLog(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install tracing subscriber: {}", e))?;

    tracing::info!(path = %path.display(), "fetchq logging initialized");
    Ok(())
}

pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}
