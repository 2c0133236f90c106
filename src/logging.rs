//! Logging setup
//!
//! Console output is always on. File logging (daily rotation) is enabled in
//! debug mode or when an explicit log directory is configured.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE_PREFIX: &str = "wabridge.log";

#[derive(Debug, Clone)]
pub struct LogConfig {
    debug_mode: bool,
    level: String,
    log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self {
            debug_mode: false,
            level: "info".to_string(),
            log_dir: None,
        }
    }

    pub fn with_debug_mode(mut self, debug: bool) -> Self {
        self.debug_mode = debug;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = Some(dir);
        self
    }

    fn effective_level(&self) -> &str {
        if self.debug_mode { "debug" } else { &self.level }
    }

    fn file_dir(&self) -> Option<PathBuf> {
        match (&self.log_dir, self.debug_mode) {
            (Some(dir), _) => Some(dir.clone()),
            (None, true) => Some(default_log_dir()),
            (None, false) => None,
        }
    }
}

/// Default location for debug logs: `./.wabridge/logs`
fn default_log_dir() -> PathBuf {
    PathBuf::from(".wabridge").join("logs")
}

/// The configured log directory, or the debug-mode default.
fn resolve_log_dir(configured: Option<&Path>) -> PathBuf {
    configured.map(Path::to_path_buf).unwrap_or_else(default_log_dir)
}

/// Path of the log directory in use, if file logging has something to show.
pub fn get_log_path(configured: Option<&Path>) -> Option<PathBuf> {
    let dir = resolve_log_dir(configured);
    dir.exists().then_some(dir)
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// must be held for the lifetime of the process or buffered file output is lost.
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.effective_level()))
        .context("Invalid log filter")?;

    let console = fmt::layer().with_target(false);

    match config.file_dir() {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .try_init()
                .context("Logging already initialized")?;

            tracing::debug!("File logging enabled in {:?}", dir);
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()
                .context("Logging already initialized")?;
            Ok(None)
        }
    }
}

/// Remove rotated log files older than `days`. Returns how many were deleted.
pub fn cleanup_old_logs(configured: Option<&Path>, days: u64) -> Result<usize> {
    let dir = resolve_log_dir(configured);
    if !dir.exists() {
        return Ok(0);
    }
    let max_age = Duration::from_secs(days * 24 * 60 * 60);
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(LOG_FILE_PREFIX) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if now.duration_since(modified).unwrap_or_default() > max_age {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    Ok(removed)
}
