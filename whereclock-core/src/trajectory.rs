//! Completed trajectories and the persisted trajectory log.
//!
//! The log is loaded once at startup and written back in full on every
//! append. There is no incremental update and no per-entry versioning.

use log::info;
use serde::{Deserialize, Serialize};

use crate::GpsPoint;
use crate::error::{OptionExt, Result};
use crate::geo_utils::path_length_km;

/// Storage key holding the serialized trajectory collection.
pub const TRAJECTORIES_KEY: &str = "trayectos";

/// A finished recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trajectory {
    /// Samples in capture order
    pub points: Vec<GpsPoint>,
    /// Path length in kilometers
    pub distance_km: f64,
    /// Elapsed recording time in seconds
    pub duration_seconds: u32,
    /// Unix timestamp (seconds) at which the recording was stopped
    pub recorded_at: i64,
}

impl Trajectory {
    /// Summarize a track. Returns `None` for fewer than 2 points.
    pub fn from_track(points: Vec<GpsPoint>, duration_seconds: u32, recorded_at: i64) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let distance_km = path_length_km(&points);
        Some(Self {
            points,
            distance_km,
            duration_seconds,
            recorded_at,
        })
    }

    /// Average speed in km/h, if any time elapsed.
    pub fn average_speed_kmh(&self) -> Option<f64> {
        (self.duration_seconds > 0).then(|| self.distance_km / (self.duration_seconds as f64 / 3600.0))
    }
}

/// Durable key-value backing for the trajectory collection.
pub trait TrajectoryStore {
    /// Read the whole collection. A missing key is an empty collection.
    fn load(&self) -> Result<Vec<Trajectory>>;

    /// Replace the whole collection.
    fn save(&mut self, trajectories: &[Trajectory]) -> Result<()>;
}

/// In-memory store holding the JSON text, as a key-value store would.
#[derive(Debug, Default, Clone)]
pub struct MemoryTrajectoryStore {
    json: Option<String>,
    writes: u32,
}

impl MemoryTrajectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of full rewrites performed so far.
    pub fn write_count(&self) -> u32 {
        self.writes
    }

    pub fn raw(&self) -> Option<&str> {
        self.json.as_deref()
    }
}

impl TrajectoryStore for MemoryTrajectoryStore {
    fn load(&self) -> Result<Vec<Trajectory>> {
        match &self.json {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&mut self, trajectories: &[Trajectory]) -> Result<()> {
        self.json = Some(serde_json::to_string(trajectories)?);
        self.writes += 1;
        Ok(())
    }
}

/// The persisted collection of trajectories.
///
/// The log does not own its store, so the owner can share one key-value
/// store between the log and other settings.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryLog {
    entries: Vec<Trajectory>,
}

impl TrajectoryLog {
    /// Load the collection once from `store`.
    pub fn load(store: &dyn TrajectoryStore) -> Result<Self> {
        let entries = store.load()?;
        info!("[TrajectoryLog] Loaded {} trajectories", entries.len());
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[Trajectory] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Result<&Trajectory> {
        self.entries.last().ok_or_persistence("trajectory log is empty")
    }

    /// Append and persist the full collection. On a failed write the entry
    /// is not kept in memory either.
    pub fn append(&mut self, trajectory: Trajectory, store: &mut dyn TrajectoryStore) -> Result<()> {
        self.entries.push(trajectory);
        if let Err(e) = store.save(&self.entries) {
            self.entries.pop();
            return Err(e);
        }
        info!(
            "[TrajectoryLog] Saved trajectory #{} ({:.2} km)",
            self.entries.len(),
            self.entries[self.entries.len() - 1].distance_km
        );
        Ok(())
    }
}
