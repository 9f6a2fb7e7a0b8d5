//! Tracing subscriber setup.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogConfig;
use crate::error::{ConfigError, Result};

/// File name prefix for the daily rolling log.
pub const LOG_FILE_PREFIX: &str = "docx-toolbox.log";

/// Install the global subscriber: stderr always, plus a daily rolling file
/// under `config.log_dir` when set.
///
/// `RUST_LOG` overrides `config.level`. Keep the returned guard alive for as
/// long as file logging should keep flushing.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| ConfigError::InvalidValue {
            key: "log.level".to_string(),
            message: e.to_string(),
        })?,
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|_| ConfigError::LoggingAlreadyInitialised)?;

    Ok(guard)
}

/// Where a task's own log goes: `<log_dir>/<YYYY-MM-DD>/<task_id>.log`.
pub fn task_log_path(log_dir: &Path, task_id: &str, date: NaiveDate) -> PathBuf {
    log_dir
        .join(date.format("%Y-%m-%d").to_string())
        .join(format!("{task_id}.log"))
}

/// A per-task subscriber writing every event at debug and above to one file.
pub(crate) struct TaskLog {
    pub path: PathBuf,
    pub dispatch: Dispatch,
    /// Flushes the file when dropped.
    pub guard: WorkerGuard,
}

/// Open the log file for `task_id` under today's directory. Events emitted
/// while the task's future runs under `dispatch` land there and on stderr.
pub(crate) fn open_task_log(log_dir: &Path, task_id: &str) -> std::io::Result<TaskLog> {
    let path = task_log_path(log_dir, task_id, chrono::Local::now().date_naive());
    let dir = path.parent().unwrap_or(log_dir);
    std::fs::create_dir_all(dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(format!("{task_id}.log"))
        .build(dir)
        .map_err(std::io::Error::other)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer)
                .with_filter(LevelFilter::DEBUG),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(LevelFilter::INFO),
        );

    Ok(TaskLog {
        path,
        dispatch: Dispatch::new(subscriber),
        guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    #[test]
    fn task_log_path_layout() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            task_log_path(Path::new("/var/log/docx"), "abc123", date),
            PathBuf::from("/var/log/docx/2024-03-09/abc123.log")
        );
    }

    #[test]
    fn task_log_captures_events() {
        let dir = TempDir::new().unwrap();
        let log = open_task_log(dir.path(), "feedbeef0001").unwrap();
        assert!(log.path.starts_with(dir.path()));
        assert!(log.path.ends_with("feedbeef0001.log"));

        tracing::dispatcher::with_default(&log.dispatch, || {
            tracing::debug!(task_id = "feedbeef0001", "Converting page 1");
        });
        drop(log.guard);

        let contents = std::fs::read_to_string(&log.path).unwrap();
        assert!(contents.contains("Converting page 1"), "{contents}");
    }

    #[test]
    fn init_once_with_file_sink() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig {
            level: "debug".to_string(),
            log_dir: Some(dir.path().join("logs")),
        };

        let guard = init(&config).unwrap();
        assert!(guard.is_some());
        assert!(dir.path().join("logs").is_dir());

        tracing::info!(task_id = "abc123", "Job started");
        drop(guard);

        let written: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
            .collect();
        assert_eq!(written.len(), 1);

        match init(&LogConfig::default()) {
            Err(Error::Config(ConfigError::LoggingAlreadyInitialised)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second init should fail"),
        }
    }
}
