//! GPS track recorder ("trayecto").
//!
//! Two states, `Idle` and `Recording`. Every recording gets a fresh
//! [`RecordingId`]; the once-per-second tick and the position subscription
//! carry that id back in, and anything carrying an old id is dropped. This is
//! what keeps late callbacks from touching an idle recorder.

use log::{debug, info};

use crate::GpsPoint;
use crate::error::{Result, WhereClockError};
use crate::trajectory::Trajectory;

/// Identifies one start/stop cycle of the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordingId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording(RecordingId),
}

impl RecorderState {
    fn name(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording(_) => "recording",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrajectoryRecorder {
    state: RecorderState,
    track: Vec<GpsPoint>,
    elapsed_seconds: u32,
    next_id: u64,
}

impl Default for TrajectoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TrajectoryRecorder {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
            track: Vec::new(),
            elapsed_seconds: 0,
            next_id: 1,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording(_))
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    /// Working track of the current (or last) recording.
    pub fn track(&self) -> &[GpsPoint] {
        &self.track
    }

    /// Begin a recording. Only valid from `Idle`; otherwise the state is
    /// left untouched and an error is returned.
    pub fn start(&mut self) -> Result<RecordingId> {
        if self.is_recording() {
            return Err(self.invalid("start"));
        }
        let id = RecordingId(self.next_id);
        self.next_id += 1;
        self.track.clear();
        self.elapsed_seconds = 0;
        self.state = RecorderState::Recording(id);
        info!("[Recorder] Started recording #{}", id.0);
        Ok(id)
    }

    /// One second elapsed. Returns the new elapsed count, or `None` if the
    /// tick belongs to a recording that is no longer running.
    pub fn tick(&mut self, id: RecordingId) -> Option<u32> {
        if self.state != RecorderState::Recording(id) {
            return None;
        }
        self.elapsed_seconds += 1;
        Some(self.elapsed_seconds)
    }

    /// Append a position sample. Returns whether the point was kept.
    pub fn record_point(&mut self, id: RecordingId, point: GpsPoint) -> bool {
        if self.state != RecorderState::Recording(id) {
            return false;
        }
        if !point.is_valid() {
            debug!("[Recorder] Dropping invalid point {:?}", point);
            return false;
        }
        self.track.push(point);
        true
    }

    /// End the recording. Yields a [`Trajectory`] when at least two points
    /// were captured; shorter recordings are discarded.
    pub fn stop(&mut self, recorded_at: i64) -> Result<Option<Trajectory>> {
        if !self.is_recording() {
            return Err(self.invalid("stop"));
        }
        self.state = RecorderState::Idle;

        let points = std::mem::take(&mut self.track);
        let count = points.len();
        let trajectory = Trajectory::from_track(points, self.elapsed_seconds, recorded_at);
        match &trajectory {
            Some(t) => info!(
                "[Recorder] Stopped: {} points, {:.2} km in {}s",
                count, t.distance_km, t.duration_seconds
            ),
            None => info!("[Recorder] Stopped with {} points, discarding", count),
        }
        Ok(trajectory)
    }

    fn invalid(&self, operation: &'static str) -> WhereClockError {
        WhereClockError::InvalidTransition {
            machine: "TrajectoryRecorder",
            from: self.state.name(),
            operation,
        }
    }
}
