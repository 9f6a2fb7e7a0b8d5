//! Configuration types.

use std::path::PathBuf;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Worker pool size. Values below 1 are treated as 1.
    pub max_workers: usize,
    /// Default retry limit for `retry_failed`.
    pub max_retries: u32,
    /// Logging setup.
    pub log: LogConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_workers: 1,
            max_retries: 1,
            log: LogConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Load from `DOCX_TOOLBOX_*` environment variables, falling back to
    /// defaults for anything missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_workers: usize = std::env::var("DOCX_TOOLBOX_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_workers)
            .max(1);

        let max_retries: u32 = std::env::var("DOCX_TOOLBOX_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_retries);

        Self {
            max_workers,
            max_retries,
            log: LogConfig::from_env(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for the rolling log file. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let level = std::env::var("DOCX_TOOLBOX_LOG_LEVEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        let log_dir = std::env::var("DOCX_TOOLBOX_LOG_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self { level, log_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.log.level, "info");
        assert!(config.log.log_dir.is_none());
    }

    #[test]
    fn from_env_without_overrides_is_sane() {
        let config = RunnerConfig::from_env();
        assert!(config.max_workers >= 1);
        assert!(!config.log.level.is_empty());
    }
}
