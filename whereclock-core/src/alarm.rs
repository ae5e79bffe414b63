//! Alarm playback state machine.
//!
//! [`AlarmController`] owns the [`AlarmState`] flags, the selected [`Tone`]
//! and the audio device. Timers are not run here: [`AlarmController::activate`]
//! hands back an [`AutoStop`] token, the runtime sleeps for `after`, then calls
//! [`AlarmController::on_auto_stop`]. Tokens carry a generation number, so a
//! token that outlives an explicit [`AlarmController::stop`] (or a restart) is
//! ignored.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WhereClockError};

/// Auto-stop delay used when nothing else is configured.
pub const DEFAULT_AUTO_STOP: Duration = Duration::from_secs(10);

/// Alarm flags owned by the foreground session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmState {
    /// User-controlled master switch
    pub enabled: bool,
    /// Edge-trigger latch: true while the last successful sample was inside
    pub inside_zone: bool,
    /// Audio is currently looping
    pub playing: bool,
}

impl Default for AlarmState {
    fn default() -> Self {
        Self {
            enabled: true,
            inside_zone: false,
            playing: false,
        }
    }
}

/// The bundled alarm sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tone {
    #[default]
    Alarm1,
    Alarm2,
    Alarm3,
    Alarm4,
}

impl Tone {
    pub const ALL: [Tone; 4] = [Tone::Alarm1, Tone::Alarm2, Tone::Alarm3, Tone::Alarm4];

    /// Asset path of the sound file, relative to the app origin.
    pub fn path(&self) -> &'static str {
        match self {
            Tone::Alarm1 => "sounds/alarma1.mp3",
            Tone::Alarm2 => "sounds/alarma2.mp3",
            Tone::Alarm3 => "sounds/alarma3.mp3",
            Tone::Alarm4 => "sounds/alarma4.mp3",
        }
    }

    /// Parse a selector value; a leading `/` is accepted.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim_start_matches('/');
        Self::ALL.into_iter().find(|t| t.path() == path)
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Audio device seam. Implementations start playback from the beginning on
/// every `play` call.
pub trait AudioOutput {
    /// Start playing `tone`. Errors (autoplay restrictions, missing asset)
    /// are reported, never panicked on.
    fn play(&mut self, tone: Tone, looping: bool) -> Result<()>;

    /// Halt playback and rewind.
    fn stop(&mut self);
}

/// Audio output that plays nothing and records every call, e.g.
/// `"play sounds/alarma1.mp3 loop=true"` or `"stop"`. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct MemoryAudio {
    calls: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryAudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `play` calls fail, as a blocked autoplay would.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.log().clone()
    }

    fn log(&self) -> MutexGuard<'_, Vec<String>> {
        match self.calls.lock() {
            Ok(calls) => calls,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AudioOutput for MemoryAudio {
    fn play(&mut self, tone: Tone, looping: bool) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WhereClockError::AudioFailed {
                message: "playback blocked".to_string(),
            });
        }
        self.log().push(format!("play {} loop={}", tone, looping));
        Ok(())
    }

    fn stop(&mut self) {
        self.log().push("stop".to_string());
    }
}

/// How a looping alarm ends when nobody presses "stop".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStopPolicy {
    /// Stop automatically after the given delay
    After(Duration),
    /// Play until stopped from the notification or the toggle
    Manual,
}

impl Default for AutoStopPolicy {
    fn default() -> Self {
        AutoStopPolicy::After(DEFAULT_AUTO_STOP)
    }
}

/// Request to call [`AlarmController::on_auto_stop`] after `after` elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoStop {
    pub generation: u64,
    pub after: Duration,
}

/// Owns alarm playback and the enabled/latch flags.
pub struct AlarmController {
    state: AlarmState,
    tone: Tone,
    policy: AutoStopPolicy,
    output: Box<dyn AudioOutput + Send>,
    generation: u64,
    pending_auto_stop: Option<u64>,
}

impl fmt::Debug for AlarmController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmController")
            .field("state", &self.state)
            .field("tone", &self.tone)
            .field("policy", &self.policy)
            .field("generation", &self.generation)
            .field("pending_auto_stop", &self.pending_auto_stop)
            .finish_non_exhaustive()
    }
}

impl AlarmController {
    pub fn new(output: Box<dyn AudioOutput + Send>, policy: AutoStopPolicy) -> Self {
        Self {
            state: AlarmState::default(),
            tone: Tone::default(),
            policy,
            output,
            generation: 0,
            pending_auto_stop: None,
        }
    }

    pub fn state(&self) -> &AlarmState {
        &self.state
    }

    /// Mutable access for the zone monitor, which owns latch transitions.
    pub fn state_mut(&mut self) -> &mut AlarmState {
        &mut self.state
    }

    pub fn tone(&self) -> Tone {
        self.tone
    }

    pub fn select_tone(&mut self, tone: Tone) {
        self.tone = tone;
    }

    pub fn policy(&self) -> AutoStopPolicy {
        self.policy
    }

    /// Start looping the selected tone from the beginning, restarting it if
    /// it is already playing.
    ///
    /// Returns the auto-stop request to schedule, if the policy has one. Any
    /// previously issued token becomes stale.
    pub fn activate(&mut self) -> Result<Option<AutoStop>> {
        if self.state.playing {
            self.output.stop();
        }
        self.generation += 1;
        self.pending_auto_stop = None;

        if let Err(e) = self.output.play(self.tone, true) {
            warn!("[Alarm] Failed to play {}: {}", self.tone, e);
            self.state.playing = false;
            return Err(e);
        }

        self.state.playing = true;
        info!("[Alarm] Playing {}", self.tone);

        match self.policy {
            AutoStopPolicy::After(after) => {
                self.pending_auto_stop = Some(self.generation);
                Ok(Some(AutoStop {
                    generation: self.generation,
                    after,
                }))
            }
            AutoStopPolicy::Manual => Ok(None),
        }
    }

    /// Auto-stop timer elapsed. Returns whether the alarm was stopped.
    pub fn on_auto_stop(&mut self, generation: u64) -> bool {
        if self.pending_auto_stop != Some(generation) {
            debug!("[Alarm] Ignoring stale auto-stop #{}", generation);
            return false;
        }
        info!("[Alarm] Auto-stop after timeout");
        self.stop();
        true
    }

    /// Play `tone` once without touching `playing` or the auto-stop timer.
    pub fn preview(&mut self, tone: Tone) -> Result<()> {
        self.output.play(tone, false).inspect_err(|e| {
            warn!("[Alarm] Failed to preview {}: {}", tone, e);
        })
    }

    /// Halt playback and cancel any pending auto-stop. No-op when silent.
    pub fn stop(&mut self) {
        self.pending_auto_stop = None;
        if !self.state.playing {
            return;
        }
        self.output.stop();
        self.state.playing = false;
        info!("[Alarm] Stopped");
    }

    /// Set the master switch. Either direction clears the latch, so
    /// re-enabling needs a fresh zone entry to fire.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.state.enabled = enabled;
        self.state.inside_zone = false;
        info!(
            "[Alarm] {}",
            if enabled { "Enabled" } else { "Disabled" }
        );
    }

    /// Flip the master switch (the UI toggle button).
    pub fn toggle(&mut self) -> bool {
        let enabled = !self.state.enabled;
        self.set_enabled(enabled);
        enabled
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn controller(policy: AutoStopPolicy) -> (AlarmController, MemoryAudio) {
        let audio = MemoryAudio::new();
        (AlarmController::new(Box::new(audio.clone()), policy), audio)
    }

    #[test]
    fn test_activate_and_stop() {
        let (mut alarm, audio) = controller(AutoStopPolicy::default());

        let token = alarm.activate().unwrap().unwrap();
        assert_eq!(token.after, DEFAULT_AUTO_STOP);
        assert!(alarm.state().playing);

        alarm.stop();
        assert!(!alarm.state().playing);
        // Stale token does nothing after an explicit stop
        assert!(!alarm.on_auto_stop(token.generation));

        // Stop is idempotent
        alarm.stop();
        let calls = audio.calls();
        assert_eq!(
            calls,
            vec!["play sounds/alarma1.mp3 loop=true", "stop"]
        );
    }

    #[test]
    fn test_auto_stop_fires_once() {
        let (mut alarm, _audio) = controller(AutoStopPolicy::default());
        let token = alarm.activate().unwrap().unwrap();

        assert!(alarm.on_auto_stop(token.generation));
        assert!(!alarm.state().playing);
        assert!(!alarm.on_auto_stop(token.generation));
    }

    #[test]
    fn test_restart_invalidates_previous_timer() {
        let (mut alarm, audio) = controller(AutoStopPolicy::default());
        let first = alarm.activate().unwrap().unwrap();
        let second = alarm.activate().unwrap().unwrap();

        assert_ne!(first.generation, second.generation);
        assert!(!alarm.on_auto_stop(first.generation));
        assert!(alarm.state().playing);
        assert!(alarm.on_auto_stop(second.generation));

        // Restart stops and replays from the beginning
        let calls = audio.calls();
        assert_eq!(calls[1], "stop");
        assert_eq!(calls[2], "play sounds/alarma1.mp3 loop=true");
    }

    #[test]
    fn test_manual_policy_has_no_timer() {
        let (mut alarm, _audio) = controller(AutoStopPolicy::Manual);
        assert_eq!(alarm.activate().unwrap(), None);
        assert!(alarm.state().playing);
    }

    #[test]
    fn test_playback_failure_is_reported() {
        let (mut alarm, audio) = controller(AutoStopPolicy::default());
        audio.set_failing(true);

        assert!(alarm.activate().is_err());
        assert!(!alarm.state().playing);
    }

    #[test]
    fn test_preview_leaves_state_alone() {
        let (mut alarm, audio) = controller(AutoStopPolicy::default());
        let token = alarm.activate().unwrap().unwrap();

        alarm.preview(Tone::Alarm3).unwrap();
        assert!(alarm.state().playing);
        assert!(alarm.on_auto_stop(token.generation));

        let calls = audio.calls();
        assert!(calls.contains(&"play sounds/alarma3.mp3 loop=false".to_string()));
    }

    #[test]
    fn test_set_enabled_clears_latch() {
        let (mut alarm, _audio) = controller(AutoStopPolicy::default());
        alarm.state_mut().inside_zone = true;

        alarm.set_enabled(false);
        assert!(!alarm.state().enabled);
        assert!(!alarm.state().inside_zone);

        alarm.state_mut().inside_zone = true;
        assert!(alarm.toggle());
        assert!(!alarm.state().inside_zone);
    }

    #[test]
    fn test_tone_paths() {
        assert_eq!(Tone::from_path("/sounds/alarma2.mp3"), Some(Tone::Alarm2));
        assert_eq!(Tone::from_path("sounds/alarma4.mp3"), Some(Tone::Alarm4));
        assert_eq!(Tone::from_path("sounds/other.mp3"), None);
    }
}
