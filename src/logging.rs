//! File logging for vmemo.
//!
//! Everything goes to `vmemo.log.YYYY-MM-DD` under the XDG state directory;
//! nothing is printed to the terminal while the TUI owns it. Rotated files
//! older than a week are pruned at startup.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Base name of the daily log files.
pub const LOG_FILE_PREFIX: &str = "vmemo.log";

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info";

const RETAINED_DAYS: usize = 7;

/// Flushes buffered lines when the process exits.
static WRITER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber writing to the daily log file.
///
/// # Errors
/// - If the log directory cannot be resolved or created
/// - If logging was already initialized
pub fn init_logging() -> anyhow::Result<()> {
    let dir = log_dir()?;
    fs::create_dir_all(&dir)?;

    let pruned = prune_logs(&dir);

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(&dir, LOG_FILE_PREFIX));
    WRITER_GUARD
        .set(guard)
        .map_err(|_| anyhow::anyhow!("Logging already initialized"))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_thread_ids(true)
                .with_ansi(false),
        )
        .init();

    match pruned {
        Ok(0) => {}
        Ok(count) => tracing::debug!("Removed {} old log file(s)", count),
        Err(e) => tracing::warn!("Could not prune old logs in {}: {}", dir.display(), e),
    }
    tracing::debug!("Logging to {}", dir.display());
    Ok(())
}

/// `$XDG_STATE_HOME/vmemo`, or `~/.local/state/vmemo`.
///
/// # Errors
/// - If neither variable nor home directory is available
pub fn log_dir() -> anyhow::Result<PathBuf> {
    log_dir_from(std::env::var_os("XDG_STATE_HOME"), dirs::home_dir())
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

fn log_dir_from(xdg_state: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    match xdg_state.filter(|dir| !dir.is_empty()) {
        Some(dir) => Some(PathBuf::from(dir).join("vmemo")),
        None => home.map(|home| home.join(".local/state/vmemo")),
    }
}

/// Deletes rotated logs beyond the retention window. Returns how many went.
fn prune_logs(dir: &Path) -> std::io::Result<usize> {
    let names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();

    let mut removed = 0;
    for name in stale_logs(&names, RETAINED_DAYS) {
        match fs::remove_file(dir.join(name)) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Warning: failed to delete old log {name}: {e}"),
        }
    }
    Ok(removed)
}

/// Rotated log names beyond the newest `keep` days.
///
/// The date suffix sorts lexically, so no file metadata is needed.
fn stale_logs(names: &[String], keep: usize) -> Vec<&str> {
    let mut dated: Vec<(&str, &str)> = names
        .iter()
        .filter_map(|name| log_date(name).map(|date| (date, name.as_str())))
        .collect();
    dated.sort_unstable_by(|a, b| b.0.cmp(a.0));
    dated.into_iter().skip(keep).map(|(_, name)| name).collect()
}

/// The `YYYY-MM-DD` part of `vmemo.log.YYYY-MM-DD`.
fn log_date(file_name: &str) -> Option<&str> {
    let date = file_name.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(date)
}
