//! Error types for tepdiag.
//!
//! Library crates use [`TepError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum TepError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Dataframe engine error (CSV/Parquet parsing, column access, casting).
    #[error("data error: {0}")]
    Data(String),

    /// Model fitting or prediction error.
    #[error("model error: {0}")]
    Model(String),

    /// Artifact (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Data validation error (bad parameters, missing columns, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A required upstream artifact is not present in the store.
    #[error("missing artifact: {}", key.display())]
    MissingArtifact { key: PathBuf },

    /// The merged master dataset has not been produced yet.
    #[error("master dataset missing at {}; run the merge stage first", path.display())]
    MasterMissing { path: PathBuf },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TepError>;

impl TepError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap any dataframe engine error.
    pub fn data(err: impl std::fmt::Display) -> Self {
        Self::Data(err.to_string())
    }

    /// Wrap any model library error.
    pub fn model(err: impl std::fmt::Display) -> Self {
        Self::Model(err.to_string())
    }

    /// A missing artifact at `key`.
    pub fn missing(key: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact { key: key.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TepError::config("test_size must be positive");
        assert_eq!(err.to_string(), "config error: test_size must be positive");

        let err = TepError::validation("column 'faultNumber' not found");
        assert!(err.to_string().contains("faultNumber"));
    }

    #[test]
    fn master_missing_names_path() {
        let err = TepError::MasterMissing {
            path: PathBuf::from("data/processed/tep_master.parquet"),
        };
        let msg = err.to_string();
        assert!(msg.contains("tep_master.parquet"));
        assert!(msg.contains("merge stage"));
    }
}
