//! Error types for the app layer.

use thiserror::Error;
use whereclock_core::WhereClockError;

/// Failure to get a response from the network at all. An HTTP error status
/// is a response, not a `NetworkError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("network unavailable")]
    Offline,
    #[error("request failed: {0}")]
    Request(String),
}

/// Failure to raise a system notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("notification failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Core(#[from] WhereClockError),

    /// A manifest entry answered with a non-success status during install
    #[error("Install failed: {url} returned HTTP {status}")]
    InstallFailed { url: String, status: u16 },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background worker is not running")]
    WorkerGone,

    #[error("Session is not running")]
    SessionGone,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<AppError> for WhereClockError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Core(inner) => inner,
            other => WhereClockError::PersistenceError {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::InstallFailed {
            url: "https://whereclock.app/style.css".to_string(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "Install failed: https://whereclock.app/style.css returned HTTP 404"
        );

        let err: AppError = NetworkError::Offline.into();
        assert_eq!(err.to_string(), "network unavailable");
    }

    #[test]
    fn test_into_core_error() {
        let core: WhereClockError = AppError::Config("bad".to_string()).into();
        assert!(matches!(core, WhereClockError::PersistenceError { .. }));
    }
}
