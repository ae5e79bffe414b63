//! Unified error handling for the whereclock core state machines.
//!
//! Every fallible core operation returns [`Result`], so callers in the app
//! layer can propagate with `?` instead of matching on ad-hoc booleans.

use std::fmt;

/// Unified error type for whereclock core operations.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClockError {
    /// Zone radius is not a positive, finite number of meters
    InvalidZone { radius_meters: f64 },
    /// A coordinate is outside the WGS84 range or not finite
    InvalidCoordinates { latitude: f64, longitude: f64 },
    /// A state machine was asked to move along an edge it does not have
    InvalidTransition {
        machine: &'static str,
        from: &'static str,
        operation: &'static str,
    },
    /// Audio playback was rejected by the output device
    AudioFailed { message: String },
    /// Persistence/storage error
    PersistenceError { message: String },
    /// Stored data could not be encoded or decoded
    SerializationError { message: String },
}

impl fmt::Display for WhereClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhereClockError::InvalidZone { radius_meters } => {
                write!(
                    f,
                    "Zone radius must be a positive number of meters, got {}",
                    radius_meters
                )
            }
            WhereClockError::InvalidCoordinates {
                latitude,
                longitude,
            } => {
                write!(f, "Invalid coordinates ({}, {})", latitude, longitude)
            }
            WhereClockError::InvalidTransition {
                machine,
                from,
                operation,
            } => {
                write!(f, "{}: cannot {} while {}", machine, operation, from)
            }
            WhereClockError::AudioFailed { message } => {
                write!(f, "Audio playback failed: {}", message)
            }
            WhereClockError::PersistenceError { message } => {
                write!(f, "Persistence error: {}", message)
            }
            WhereClockError::SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
        }
    }
}

impl std::error::Error for WhereClockError {}

impl From<serde_json::Error> for WhereClockError {
    fn from(e: serde_json::Error) -> Self {
        WhereClockError::SerializationError {
            message: e.to_string(),
        }
    }
}

/// Result type alias for whereclock core operations.
pub type Result<T> = std::result::Result<T, WhereClockError>;

/// Extension trait for converting Option to WhereClockError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a persistence error.
    fn ok_or_persistence(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_persistence(self, message: &str) -> Result<T> {
        self.ok_or_else(|| WhereClockError::PersistenceError {
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WhereClockError::InvalidTransition {
            machine: "TrajectoryRecorder",
            from: "idle",
            operation: "stop",
        };
        assert_eq!(err.to_string(), "TrajectoryRecorder: cannot stop while idle");

        let err = WhereClockError::InvalidZone { radius_meters: -5.0 };
        assert!(err.to_string().contains("-5"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_persistence("missing key");
        assert!(matches!(
            result,
            Err(WhereClockError::PersistenceError { .. })
        ));
    }
}
