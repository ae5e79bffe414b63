//! Circular geofence and the edge-triggered zone monitor.
//!
//! The monitor turns a stream of position samples into at most one
//! [`ZoneTransition::Entered`] per continuous dwell inside the zone. The
//! latch (`AlarmState::inside_zone`) is set on entry and cleared by any
//! successful sample outside the radius. Failed samples and fixes with
//! out-of-range coordinates leave it untouched.
//!
//! ## Example
//! ```rust
//! use whereclock_core::{AlarmState, GpsPoint, Zone, ZoneMonitor, ZoneTransition};
//!
//! let mut monitor = ZoneMonitor::new(Zone::new(40.4168, -3.7038, 300.0).unwrap());
//! let mut state = AlarmState::default();
//!
//! let here = GpsPoint::new(40.4168, -3.7038);
//! assert!(matches!(monitor.observe(Ok(here), &mut state), ZoneTransition::Entered { .. }));
//! assert_eq!(monitor.observe(Ok(here), &mut state), ZoneTransition::StillInside);
//! ```

use log::debug;
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmState;
use crate::error::{Result, WhereClockError};
use crate::geo_utils::haversine_distance;
use crate::{GpsPoint, PositionSample};

/// Center of the zone the app starts with (Puerta del Sol, Madrid).
pub const DEFAULT_ZONE_CENTER: GpsPoint = GpsPoint {
    latitude: 40.4168,
    longitude: -3.7038,
};

/// Radius of the zone the app starts with, in meters.
pub const DEFAULT_ZONE_RADIUS_M: f64 = 300.0;

/// A user-defined circular geofence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl Zone {
    /// Create a zone. The radius must be positive and finite; there is no
    /// other bound.
    pub fn new(latitude: f64, longitude: f64, radius_meters: f64) -> Result<Self> {
        let center = GpsPoint::new(latitude, longitude);
        if !center.is_valid() {
            return Err(WhereClockError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }
        validate_radius(radius_meters)?;
        Ok(Self {
            latitude,
            longitude,
            radius_meters,
        })
    }

    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    /// Move the zone (map click, marker drag, "use my location").
    pub fn set_center(&mut self, center: GpsPoint) -> Result<()> {
        if !center.is_valid() {
            return Err(WhereClockError::InvalidCoordinates {
                latitude: center.latitude,
                longitude: center.longitude,
            });
        }
        self.latitude = center.latitude;
        self.longitude = center.longitude;
        Ok(())
    }

    pub fn set_radius(&mut self, radius_meters: f64) -> Result<()> {
        validate_radius(radius_meters)?;
        self.radius_meters = radius_meters;
        Ok(())
    }

    /// Great-circle distance from the zone center to `point`, in meters.
    pub fn distance_to(&self, point: &GpsPoint) -> f64 {
        haversine_distance(point, &self.center())
    }

    /// Whether `point` lies within the radius (boundary inclusive).
    pub fn contains(&self, point: &GpsPoint) -> bool {
        self.distance_to(point) <= self.radius_meters
    }
}

impl Default for Zone {
    fn default() -> Self {
        Self {
            latitude: DEFAULT_ZONE_CENTER.latitude,
            longitude: DEFAULT_ZONE_CENTER.longitude,
            radius_meters: DEFAULT_ZONE_RADIUS_M,
        }
    }
}

fn validate_radius(radius_meters: f64) -> Result<()> {
    if radius_meters.is_finite() && radius_meters > 0.0 {
        Ok(())
    } else {
        Err(WhereClockError::InvalidZone { radius_meters })
    }
}

/// Outcome of feeding one position sample to the monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneTransition {
    /// Alarm disabled; the sample was not looked at
    Ignored,
    /// No usable position (source error or invalid coordinates); the
    /// latch keeps its value
    NoFix,
    /// First sample inside the zone since the latch was last cleared.
    /// The caller must activate the alarm and request a notification.
    Entered { distance: f64 },
    /// Inside, but the alarm already fired for this dwell
    StillInside,
    /// Outside the radius; the latch is rearmed
    Outside { distance: f64 },
}

/// Edge-triggered geofence monitor.
///
/// Owns the [`Zone`]; the latch lives in [`AlarmState`] so that toggling the
/// alarm can clear it.
#[derive(Debug, Clone, Default)]
pub struct ZoneMonitor {
    zone: Zone,
}

impl ZoneMonitor {
    pub fn new(zone: Zone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn zone_mut(&mut self) -> &mut Zone {
        &mut self.zone
    }

    /// Replace the zone. The latch is left alone: a user already inside the
    /// new zone fires on the next sample only if the latch was clear.
    pub fn set_zone(&mut self, zone: Zone) {
        self.zone = zone;
    }

    /// Process one sample, in delivery order.
    pub fn observe(&self, sample: PositionSample, state: &mut AlarmState) -> ZoneTransition {
        if !state.enabled {
            return ZoneTransition::Ignored;
        }

        let position = match sample {
            Ok(position) => position,
            Err(e) => {
                debug!("[ZoneMonitor] No position fix: {}", e);
                return ZoneTransition::NoFix;
            }
        };
        if !position.is_valid() {
            debug!(
                "[ZoneMonitor] Discarding invalid fix ({}, {})",
                position.latitude, position.longitude
            );
            return ZoneTransition::NoFix;
        }

        let distance = self.zone.distance_to(&position);
        if distance <= self.zone.radius_meters {
            if state.inside_zone {
                ZoneTransition::StillInside
            } else {
                state.inside_zone = true;
                debug!(
                    "[ZoneMonitor] Entered zone ({:.0}m from center, radius {:.0}m)",
                    distance, self.zone.radius_meters
                );
                ZoneTransition::Entered { distance }
            }
        } else {
            state.inside_zone = false;
            ZoneTransition::Outside { distance }
        }
    }
}
