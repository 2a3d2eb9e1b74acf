// src/error.rs

//! Unified error handling for the bulk fetcher.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for bulkfetch operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failed (DNS, connect, reset, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Server answered with an error status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Body ended before the advertised length was on disk
    #[error("Incomplete download of {url}: {actual} of {expected} bytes")]
    Incomplete {
        url: String,
        expected: u64,
        actual: u64,
    },

    /// Two tasks resolved to the same destination file
    #[error("Destination {destination:?} for {url} is already claimed by another task")]
    Collision { url: String, destination: PathBuf },

    /// Work was stopped by the caller
    #[error("Cancelled")]
    Cancelled,

    /// URL is not usable as a download candidate
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Archive extraction failed
    #[error("Archive error for {path:?}: {message}")]
    Archive { path: PathBuf, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create an archive error with the offending path.
    pub fn archive(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether another attempt could change the result.
    ///
    /// Disk-full and permission errors are retried like network errors;
    /// only caller cancellation and destination collisions are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Collision { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_mentions_code() {
        let err = AppError::Status {
            url: "http://h/b.zip".into(),
            status: 503,
        };
        assert!(err.to_string().contains("503"));
        assert!(err.is_retryable());
    }

    #[test]
    fn cancellation_is_final() {
        assert!(!AppError::Cancelled.is_retryable());
        assert!(
            !AppError::Collision {
                url: "http://h/a".into(),
                destination: PathBuf::from("out/h/a"),
            }
            .is_retryable()
        );
    }
}
