//! Console and file logging for a replay run

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{ReplayError, ReplayResult};

/// Keeps the file writer alive for the lifetime of the run.
///
/// Dropping it flushes and closes `log_file`.
pub struct LoggingContext {
    log_file: PathBuf,
    _guard: WorkerGuard,
}

impl LoggingContext {
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }
}

/// `run-20240131-142501.log`
pub fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("run-{}.log", now.format("%Y%m%d-%H%M%S"))
}

/// Install the global subscriber: stdout plus `<log_dir>/run-<timestamp>.log`.
///
/// `RUST_LOG` wins over `level` when set. Fails if a subscriber is already
/// installed.
pub fn init(level: &str, log_dir: &Path) -> ReplayResult<LoggingContext> {
    std::fs::create_dir_all(log_dir)?;
    let file_name = log_file_name(chrono::Local::now());
    let log_file = log_dir.join(&file_name);

    let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.trim().to_ascii_lowercase()))
        .map_err(|e| ReplayError::Config(format!("invalid log level {:?}: {}", level, e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .map_err(|e| ReplayError::Config(format!("logging already initialized: {}", e)))?;

    Ok(LoggingContext {
        log_file,
        _guard: guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name() {
        let now = chrono::Local.with_ymd_and_hms(2024, 1, 31, 14, 25, 1).unwrap();
        assert_eq!(log_file_name(now), "run-20240131-142501.log");
    }
}
