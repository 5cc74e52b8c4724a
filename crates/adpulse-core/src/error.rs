use std::io::ErrorKind;

use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised by any pipeline stage.
///
/// The variant decides whether the retry orchestrator may run the stage
/// again; see [`PipelineError::is_retryable`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing required fields, out-of-range config or a schema mismatch.
    #[error("{message}")]
    Validation { message: String, details: Value },

    /// The dataset is too degraded to analyse.
    #[error("{message}")]
    DataQuality { message: String, details: Value },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A stage exceeded its time budget.
    #[error("{0}")]
    Timeout(String),

    /// Momentary resource exhaustion or similar recoverable compute failure.
    #[error("{0}")]
    TransientCompute(String),

    #[error("{0}")]
    Unexpected(String),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn data_quality(message: impl Into<String>, details: Value) -> Self {
        Self::DataQuality {
            message: message.into(),
            details,
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable name reported in failure envelopes and on the CLI.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::DataQuality { .. } => "DataQualityError",
            Self::Io { .. } => "IOError",
            Self::Timeout(_) => "TimeoutError",
            Self::TransientCompute(_) => "TransientComputeError",
            Self::Unexpected(_) => "UnexpectedError",
        }
    }

    /// Returns `true` for errors that are worth retrying after a back-off delay.
    ///
    /// **Retriable:** timeouts, transient compute failures, uncategorized
    /// errors, and I/O errors whose kind is transient (interrupted, timed out,
    /// would block).
    ///
    /// **Not retriable:** validation, data quality, and all other I/O errors
    /// (missing file, permission denied, ...).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation { .. } | Self::DataQuality { .. } => false,
            Self::Io { source, .. } => matches!(
                source.kind(),
                ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
            ),
            Self::Timeout(_) | Self::TransientCompute(_) | Self::Unexpected(_) => true,
        }
    }

    /// Structured context carried into the failure envelope.
    #[must_use]
    pub fn details(&self) -> Value {
        match self {
            Self::Validation { details, .. } | Self::DataQuality { details, .. } => details.clone(),
            Self::Io { path, source } => json!({
                "path": path,
                "io_error_kind": source.kind().to_string(),
            }),
            Self::Timeout(_) | Self::TransientCompute(_) | Self::Unexpected(_) => Value::Null,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    FileParse(#[from] serde_yaml::Error),

    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("config value {key} = {value} is out of range (expected {expected})")]
    OutOfRange {
        key: String,
        value: String,
        expected: String,
    },

    #[error("config validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        let details = match &err {
            ConfigError::OutOfRange { key, value, .. } => json!({ "key": key, "value": value }),
            ConfigError::InvalidEnvVar { var, .. } => json!({ "var": var }),
            ConfigError::FileIo { path, .. } => json!({ "path": path }),
            ConfigError::FileParse(_) | ConfigError::Validation(_) => Value::Null,
        };
        PipelineError::validation(err.to_string(), details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_not_retryable() {
        let err = PipelineError::validation("missing fields", Value::Null);
        assert!(!err.is_retryable());
        assert_eq!(err.error_type(), "ValidationError");
    }

    #[test]
    fn data_quality_is_not_retryable() {
        let err = PipelineError::data_quality("too many gaps", Value::Null);
        assert!(!err.is_retryable());
        assert_eq!(err.error_type(), "DataQualityError");
    }

    #[test]
    fn missing_file_is_not_retryable() {
        let err = PipelineError::io(
            "data.csv",
            std::io::Error::new(ErrorKind::NotFound, "no such file"),
        );
        assert!(!err.is_retryable());
        assert_eq!(err.error_type(), "IOError");
        assert_eq!(err.details()["path"], "data.csv");
    }

    #[test]
    fn interrupted_io_is_retryable() {
        let err = PipelineError::io(
            "data.csv",
            std::io::Error::new(ErrorKind::Interrupted, "signal"),
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn timeout_transient_and_unexpected_are_retryable() {
        assert!(PipelineError::Timeout("slow".into()).is_retryable());
        assert!(PipelineError::TransientCompute("oom".into()).is_retryable());
        assert!(PipelineError::Unexpected("boom".into()).is_retryable());
    }

    #[test]
    fn config_error_converts_to_validation() {
        let err: PipelineError = ConfigError::OutOfRange {
            key: "thresholds.low_ctr".into(),
            value: "1.5".into(),
            expected: "[0, 1]".into(),
        }
        .into();
        assert_eq!(err.error_type(), "ValidationError");
        assert_eq!(err.details()["key"], "thresholds.low_ctr");
    }
}
