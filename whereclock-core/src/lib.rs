//! # WhereClock Core
//!
//! Geofence alarm and GPS track recording, as plain state machines.
//!
//! This library provides:
//! - Great-circle distance and path length (haversine, spherical Earth)
//! - An edge-triggered zone monitor that fires once per zone entry
//! - An alarm controller with cancelable auto-stop
//! - A track recorder that summarizes recordings into trajectories
//! - The message types shared by the foreground session and the background
//!   worker
//!
//! Nothing here performs I/O or owns a timer. The `whereclock` crate drives
//! these machines from its async runtime.
//!
//! ## Quick Start
//!
//! ```rust
//! use whereclock_core::{GpsPoint, TrajectoryRecorder};
//!
//! let mut recorder = TrajectoryRecorder::new();
//! let id = recorder.start().unwrap();
//! recorder.record_point(id, GpsPoint::new(0.0, 0.0));
//! recorder.record_point(id, GpsPoint::new(0.0, 1.0));
//! recorder.tick(id);
//!
//! let trajectory = recorder.stop(0).unwrap().unwrap();
//! println!("{:.2} km in {}s", trajectory.distance_km, trajectory.duration_seconds);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, WhereClockError};

// Distance math
pub mod geo_utils;
pub use geo_utils::{EARTH_RADIUS_M, haversine_distance, path_length_km, polyline_length};

// Geofence and edge-triggered monitor
pub mod zones;
pub use zones::{Zone, ZoneMonitor, ZoneTransition};

// Alarm playback state machine
pub mod alarm;
pub use alarm::{AlarmController, AlarmState, AudioOutput, AutoStop, AutoStopPolicy, MemoryAudio, Tone};

// Track recording
pub mod recorder;
pub use recorder::{RecorderState, RecordingId, TrajectoryRecorder};

pub mod trajectory;
pub use trajectory::{
    MemoryTrajectoryStore, TRAJECTORIES_KEY, Trajectory, TrajectoryLog, TrajectoryStore,
};

// Cross-context messages
pub mod protocol;
pub use protocol::{BridgeMessage, NotificationAction, NotificationInteraction, NotificationRequest};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use whereclock_core::GpsPoint;
/// let point = GpsPoint::new(40.4168, -3.7038); // Madrid
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A track point is a GPS point in capture order.
pub type TrackPoint = GpsPoint;

/// Why the position source produced no fix. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionError {
    PermissionDenied,
    Unavailable,
    Timeout,
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionError::PermissionDenied => write!(f, "location permission denied"),
            PositionError::Unavailable => write!(f, "position unavailable"),
            PositionError::Timeout => write!(f, "position request timed out"),
        }
    }
}

impl std::error::Error for PositionError {}

/// One delivery from the position source.
pub type PositionSample = std::result::Result<GpsPoint, PositionError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(40.4168, -3.7038).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_distance_properties() {
        let points = [
            GpsPoint::new(40.4168, -3.7038),
            GpsPoint::new(-33.8688, 151.2093),
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(89.9, 179.9),
        ];
        for a in &points {
            assert_eq!(haversine_distance(a, a), 0.0);
            for b in &points {
                assert_eq!(haversine_distance(a, b), haversine_distance(b, a));
            }
        }
    }
}
