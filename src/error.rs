//! Error types for the document job core.
//!
//! Two families live here. The boundary family (`ErrorKind`, `ErrorEnvelope`,
//! `AdapterError`) is what crosses the dispatch boundary and ends up inside a
//! `Response`. The ambient family (`Error`, `ConfigError`, `ServiceError`) covers
//! the surfaces around the core: configuration, logging setup, and the task
//! service.

use serde::{Deserialize, Serialize};

/// Closed set of failure kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    UnsupportedFormat,
    PermissionDenied,
    ProcessFailed,
    /// Only produced by the dispatch layer after observing a cancel signal.
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ProcessFailed => "PROCESS_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform error envelope carried by a failed `Response`.
///
/// There is no chaining: `detail` is free text, never a nested error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ErrorEnvelope {
    pub code: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub detail: String,
}

impl ErrorEnvelope {
    pub(crate) fn new(code: ErrorKind, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message, "")
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFormat, message, "")
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message, "")
    }

    pub fn process_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProcessFailed, message, "")
    }

    pub fn internal(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message, detail)
    }

    pub(crate) fn cancelled(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, "task cancelled by user", detail)
    }

    /// Attach free-form detail text.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Fault returned by an adapter's `execute`.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// A typed domain error, forwarded verbatim by dispatch.
    #[error(transparent)]
    Task(#[from] ErrorEnvelope),

    /// The adapter observed its cancel signal and stopped early.
    #[error("cancelled: {detail}")]
    Cancelled { detail: String },

    /// Anything else. Dispatch turns this into `INTERNAL`.
    #[error("{type_name}: {message}")]
    Unexpected {
        type_name: &'static str,
        message: String,
    },
}

impl AdapterError {
    /// Wrap an arbitrary error, remembering its concrete type name.
    pub fn unexpected<E>(err: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::Unexpected {
            type_name: std::any::type_name::<E>(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        Self::unexpected(err)
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        Self::unexpected(err)
    }
}

impl From<anyhow::Error> for AdapterError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unexpected {
            type_name: "anyhow::Error",
            message: format!("{err:#}"),
        }
    }
}

/// Top-level error type for the surfaces around the core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Logging already initialised")]
    LoggingAlreadyInitialised,
}

/// Task service errors.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Task {task_id} not found")]
    NotFound { task_id: String },

    #[error("Task {task_id} already exists")]
    Duplicate { task_id: String },
}

/// Result type alias for the crate's non-boundary surfaces.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serialises_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::InvalidInput).unwrap();
        assert_eq!(json, "\"INVALID_INPUT\"");
        let parsed: ErrorKind = serde_json::from_str("\"PROCESS_FAILED\"").unwrap();
        assert_eq!(parsed, ErrorKind::ProcessFailed);
    }

    #[test]
    fn constructors_set_kind() {
        assert_eq!(ErrorEnvelope::invalid_input("x").code, ErrorKind::InvalidInput);
        assert_eq!(
            ErrorEnvelope::unsupported_format("x").code,
            ErrorKind::UnsupportedFormat
        );
        assert_eq!(
            ErrorEnvelope::permission_denied("x").code,
            ErrorKind::PermissionDenied
        );
        assert_eq!(ErrorEnvelope::process_failed("x").code, ErrorKind::ProcessFailed);
        assert_eq!(ErrorEnvelope::cancelled("").code, ErrorKind::Cancelled);
        assert_eq!(ErrorEnvelope::internal("x", "y").code, ErrorKind::Internal);
    }

    #[test]
    fn envelope_json_shape() {
        let env = ErrorEnvelope::invalid_input("bad path").with_detail("/foo/bar");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["code"], "INVALID_INPUT");
        assert_eq!(value["message"], "bad path");
        assert_eq!(value["detail"], "/foo/bar");
        assert_eq!(env.to_string(), "INVALID_INPUT: bad path");
    }

    #[test]
    fn unexpected_captures_type_name() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        match AdapterError::from(io) {
            AdapterError::Unexpected { type_name, message } => {
                assert!(type_name.ends_with("io::error::Error"), "{type_name}");
                assert_eq!(message, "disk on fire");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("root cause").context("while converting");
        match AdapterError::from(err) {
            AdapterError::Unexpected { type_name, message } => {
                assert_eq!(type_name, "anyhow::Error");
                assert_eq!(message, "while converting: root cause");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
