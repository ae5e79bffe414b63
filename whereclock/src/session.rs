//! The foreground session.
//!
//! One tokio task owns the zone monitor, the alarm, the track recorder and
//! the trajectory log. It wakes on whichever comes first, in this priority:
//!
//! 1. the alarm auto-stop deadline
//! 2. the one-second recorder tick
//! 3. a message from the worker (`stop-alarm`)
//! 4. a user command
//! 5. a position sample for the geofence
//! 6. a position sample for the running recording
//!
//! Commands sit above the position feeds so a chatty GPS cannot starve them.
//!
//! Deadlines are stored together with the generation they belong to, and the
//! core state machines reject stale generations, so nothing scheduled before
//! a `stop` can change state after it.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use whereclock_core::{
    AlarmController, AlarmState, AudioOutput, BridgeMessage, GpsPoint, PositionSample, RecordingId,
    Tone, Trajectory, TrajectoryLog, TrajectoryRecorder, Zone, ZoneMonitor, ZoneTransition,
};

use crate::bridge::NotificationBridge;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::persistence::{KeyValueStore, ZoneStore};
use crate::position::PositionSource;
use crate::worker::WorkerHandle;

/// Recorder timer cadence.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

type Reply<T> = oneshot::Sender<Result<T>>;

/// Snapshot published after every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub alarm: AlarmState,
    pub tone: Tone,
    pub zone: Zone,
    pub recording: bool,
    pub elapsed_seconds: u32,
    pub trajectory_count: usize,
}

#[derive(Debug)]
pub enum SessionCommand {
    SetZoneCenter { center: GpsPoint, reply: Reply<Zone> },
    SetZoneRadius { radius_meters: f64, reply: Reply<Zone> },
    SetZone { zone: Zone, reply: Reply<Zone> },
    ToggleAlarm { reply: Reply<bool> },
    SetAlarmEnabled { enabled: bool, reply: Reply<()> },
    SelectTone { tone: Tone, reply: Reply<()> },
    PreviewTone { tone: Tone, reply: Reply<()> },
    /// Silence the alarm, leaving it enabled
    StopAlarm { reply: Reply<()> },
    StartRecording { reply: Reply<RecordingId> },
    StopRecording { reply: Reply<Option<Trajectory>> },
    ListTrajectories { reply: Reply<Vec<Trajectory>> },
    Shutdown { reply: Reply<()> },
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| AppError::SessionGone)?;
        rx.await.map_err(|_| AppError::SessionGone)?
    }

    /// Move the zone center (map click, marker drag, "use my location").
    pub async fn set_zone_center(&self, center: GpsPoint) -> Result<Zone> {
        self.call(|reply| SessionCommand::SetZoneCenter { center, reply }).await
    }

    pub async fn set_zone_radius(&self, radius_meters: f64) -> Result<Zone> {
        self.call(|reply| SessionCommand::SetZoneRadius { radius_meters, reply }).await
    }

    pub async fn set_zone(&self, zone: Zone) -> Result<Zone> {
        self.call(|reply| SessionCommand::SetZone { zone, reply }).await
    }

    /// Flip the alarm switch. Returns the new value.
    pub async fn toggle_alarm(&self) -> Result<bool> {
        self.call(|reply| SessionCommand::ToggleAlarm { reply }).await
    }

    pub async fn set_alarm_enabled(&self, enabled: bool) -> Result<()> {
        self.call(|reply| SessionCommand::SetAlarmEnabled { enabled, reply }).await
    }

    pub async fn select_tone(&self, tone: Tone) -> Result<()> {
        self.call(|reply| SessionCommand::SelectTone { tone, reply }).await
    }

    pub async fn preview_tone(&self, tone: Tone) -> Result<()> {
        self.call(|reply| SessionCommand::PreviewTone { tone, reply }).await
    }

    pub async fn stop_alarm(&self) -> Result<()> {
        self.call(|reply| SessionCommand::StopAlarm { reply }).await
    }

    pub async fn start_recording(&self) -> Result<RecordingId> {
        self.call(|reply| SessionCommand::StartRecording { reply }).await
    }

    /// Finish the recording. `None` if fewer than two points were captured.
    pub async fn stop_recording(&self) -> Result<Option<Trajectory>> {
        self.call(|reply| SessionCommand::StopRecording { reply }).await
    }

    pub async fn trajectories(&self) -> Result<Vec<Trajectory>> {
        self.call(|reply| SessionCommand::ListTrajectories { reply }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| SessionCommand::Shutdown { reply }).await
    }

    /// Latest published snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}

enum Wake {
    AutoStop,
    Tick,
    Bridge(Option<BridgeMessage>),
    Zone(Option<PositionSample>),
    Track(Option<PositionSample>),
    Command(Option<SessionCommand>),
}

pub struct Session {
    monitor: ZoneMonitor,
    alarm: AlarmController,
    recorder: TrajectoryRecorder,
    log: TrajectoryLog,
    store: KeyValueStore,
    persist_zone: bool,
    source: Arc<dyn PositionSource>,
    bridge: NotificationBridge,
    bridge_open: bool,
    zone_feed: Option<UnboundedReceiver<PositionSample>>,
    track_feed: Option<UnboundedReceiver<PositionSample>>,
    auto_stop: Option<(u64, Instant)>,
    next_tick: Option<(RecordingId, Instant)>,
    commands: UnboundedReceiver<SessionCommand>,
    status: watch::Sender<SessionStatus>,
}

impl Session {
    /// Load persisted state, connect to the worker and spawn the session
    /// task.
    pub fn spawn(
        config: &AppConfig,
        audio: Box<dyn AudioOutput + Send>,
        source: Arc<dyn PositionSource>,
        store: KeyValueStore,
        worker: &WorkerHandle,
    ) -> Result<(SessionHandle, JoinHandle<()>)> {
        crate::init_logging();

        let log = TrajectoryLog::load(&store)?;
        let zone = if config.persist_zone {
            store.load_zone()?.unwrap_or_default()
        } else {
            Zone::default()
        };

        let alarm = AlarmController::new(audio, config.auto_stop_policy());
        let monitor = ZoneMonitor::new(zone);
        let recorder = TrajectoryRecorder::new();
        let (status_tx, status_rx) = watch::channel(snapshot(&monitor, &alarm, &recorder, &log));
        let (tx, commands) = mpsc::unbounded_channel();

        let session = Self {
            monitor,
            alarm,
            recorder,
            log,
            store,
            persist_zone: config.persist_zone,
            bridge: NotificationBridge::connect(worker),
            bridge_open: true,
            zone_feed: Some(source.subscribe()),
            track_feed: None,
            source,
            auto_stop: None,
            next_tick: None,
            commands,
            status: status_tx,
        };
        let task = tokio::spawn(session.run());
        Ok((
            SessionHandle {
                tx,
                status: status_rx,
            },
            task,
        ))
    }

    async fn run(mut self) {
        info!(
            "[Session] Started (zone {:.4},{:.4} r={:.0}m, {} trajectories)",
            self.monitor.zone().latitude,
            self.monitor.zone().longitude,
            self.monitor.zone().radius_meters,
            self.log.len()
        );
        loop {
            match self.next_wake().await {
                Wake::AutoStop => self.on_auto_stop(),
                Wake::Tick => self.on_tick(),
                Wake::Bridge(message) => self.on_bridge(message),
                Wake::Zone(sample) => self.on_zone_sample(sample),
                Wake::Track(sample) => self.on_track_sample(sample),
                Wake::Command(Some(SessionCommand::Shutdown { reply })) => {
                    let _ = reply.send(Ok(()));
                    break;
                }
                Wake::Command(Some(command)) => self.on_command(command),
                Wake::Command(None) => break,
            }
            self.publish();
        }
        self.alarm.stop();
        info!("[Session] Stopped");
    }

    async fn next_wake(&mut self) -> Wake {
        let auto_stop_at = self.auto_stop.map(|(_, at)| at);
        let tick_at = self.next_tick.map(|(_, at)| at);
        let bridge_open = self.bridge_open;
        let Self {
            bridge,
            zone_feed,
            track_feed,
            commands,
            ..
        } = self;

        tokio::select! {
            biased;
            _ = sleep_opt(auto_stop_at) => Wake::AutoStop,
            _ = sleep_opt(tick_at) => Wake::Tick,
            message = async move {
                if bridge_open { bridge.recv().await } else { pending().await }
            } => Wake::Bridge(message),
            command = commands.recv() => Wake::Command(command),
            sample = recv_opt(zone_feed.as_mut()) => Wake::Zone(sample),
            sample = recv_opt(track_feed.as_mut()) => Wake::Track(sample),
        }
    }

    fn on_auto_stop(&mut self) {
        if let Some((generation, _)) = self.auto_stop.take() {
            self.alarm.on_auto_stop(generation);
        }
    }

    fn on_tick(&mut self) {
        let Some((id, at)) = self.next_tick else {
            return;
        };
        self.next_tick = self
            .recorder
            .tick(id)
            .map(|_| (id, at + TICK_INTERVAL));
    }

    fn on_bridge(&mut self, message: Option<BridgeMessage>) {
        match message {
            Some(BridgeMessage::StopAlarm) => {
                info!("[Session] Stop requested from notification");
                self.silence();
                self.alarm.set_enabled(false);
            }
            Some(BridgeMessage::ShowAlarm) => debug!("[Session] Ignoring show-alarm from worker"),
            None => {
                warn!("[Session] Worker gone; notifications disabled");
                self.bridge_open = false;
            }
        }
    }

    fn on_zone_sample(&mut self, sample: Option<PositionSample>) {
        let Some(sample) = sample else {
            warn!("[Session] Position source closed");
            self.zone_feed = None;
            return;
        };

        if let ZoneTransition::Entered { distance } = self.monitor.observe(sample, self.alarm.state_mut()) {
            info!("[Session] Entered zone ({:.0}m from center)", distance);
            match self.alarm.activate() {
                Ok(Some(auto_stop)) => {
                    self.auto_stop = Some((auto_stop.generation, Instant::now() + auto_stop.after));
                }
                Ok(None) => self.auto_stop = None,
                // Already logged; the notification still goes out
                Err(_) => self.auto_stop = None,
            }
            self.bridge.notify();
        }
    }

    fn on_track_sample(&mut self, sample: Option<PositionSample>) {
        let Some((id, _)) = self.next_tick else {
            self.track_feed = None;
            return;
        };
        match sample {
            Some(Ok(point)) => {
                self.recorder.record_point(id, point);
            }
            Some(Err(e)) => debug!("[Session] Track sample without fix: {}", e),
            None => self.track_feed = None,
        }
    }

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SetZoneCenter { center, reply } => {
                let result = self
                    .monitor
                    .zone_mut()
                    .set_center(center)
                    .map_err(AppError::from)
                    .and_then(|()| self.zone_changed());
                let _ = reply.send(result);
            }
            SessionCommand::SetZoneRadius { radius_meters, reply } => {
                let result = self
                    .monitor
                    .zone_mut()
                    .set_radius(radius_meters)
                    .map_err(AppError::from)
                    .and_then(|()| self.zone_changed());
                let _ = reply.send(result);
            }
            SessionCommand::SetZone { zone, reply } => {
                let result = Zone::new(zone.latitude, zone.longitude, zone.radius_meters)
                    .map_err(AppError::from)
                    .and_then(|zone| {
                        self.monitor.set_zone(zone);
                        self.zone_changed()
                    });
                let _ = reply.send(result);
            }
            SessionCommand::ToggleAlarm { reply } => {
                let _ = reply.send(Ok(self.alarm.toggle()));
            }
            SessionCommand::SetAlarmEnabled { enabled, reply } => {
                self.alarm.set_enabled(enabled);
                let _ = reply.send(Ok(()));
            }
            SessionCommand::SelectTone { tone, reply } => {
                self.alarm.select_tone(tone);
                let _ = reply.send(Ok(()));
            }
            SessionCommand::PreviewTone { tone, reply } => {
                let _ = reply.send(self.alarm.preview(tone).map_err(AppError::from));
            }
            SessionCommand::StopAlarm { reply } => {
                self.silence();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::StartRecording { reply } => {
                let _ = reply.send(self.start_recording());
            }
            SessionCommand::StopRecording { reply } => {
                let _ = reply.send(self.stop_recording());
            }
            SessionCommand::ListTrajectories { reply } => {
                let _ = reply.send(Ok(self.log.entries().to_vec()));
            }
            SessionCommand::Shutdown { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn silence(&mut self) {
        self.alarm.stop();
        self.auto_stop = None;
    }

    fn zone_changed(&mut self) -> Result<Zone> {
        let zone = *self.monitor.zone();
        if self.persist_zone {
            self.store.save_zone(&zone)?;
        }
        debug!(
            "[Session] Zone {:.5},{:.5} r={:.0}m",
            zone.latitude, zone.longitude, zone.radius_meters
        );
        Ok(zone)
    }

    fn start_recording(&mut self) -> Result<RecordingId> {
        let id = self.recorder.start()?;
        self.track_feed = Some(self.source.subscribe());
        self.next_tick = Some((id, Instant::now() + TICK_INTERVAL));
        Ok(id)
    }

    fn stop_recording(&mut self) -> Result<Option<Trajectory>> {
        let trajectory = self.recorder.stop(chrono::Utc::now().timestamp())?;
        self.track_feed = None;
        self.next_tick = None;

        if let Some(trajectory) = &trajectory {
            self.log.append(trajectory.clone(), &mut self.store)?;
        } else {
            info!("[Session] Recording discarded (fewer than 2 points)");
        }
        Ok(trajectory)
    }

    fn publish(&self) {
        let next = snapshot(&self.monitor, &self.alarm, &self.recorder, &self.log);
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

fn snapshot(
    monitor: &ZoneMonitor,
    alarm: &AlarmController,
    recorder: &TrajectoryRecorder,
    log: &TrajectoryLog,
) -> SessionStatus {
    SessionStatus {
        alarm: *alarm.state(),
        tone: alarm.tone(),
        zone: *monitor.zone(),
        recording: recorder.is_recording(),
        elapsed_seconds: recorder.elapsed_seconds(),
        trajectory_count: log.len(),
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

async fn recv_opt<T>(rx: Option<&mut UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{MemoryNotifier, MemoryWindowHost};
    use crate::cache::CacheStorage;
    use crate::http::MemoryNetwork;
    use crate::position::PositionFeed;
    use crate::router::FetchRouter;
    use crate::worker::Worker;
    use whereclock_core::{MemoryAudio, NotificationInteraction, TrajectoryStore};
    use whereclock_core::protocol::STOP_ACTION;

    struct Harness {
        session: SessionHandle,
        worker: WorkerHandle,
        feed: PositionFeed,
        audio: MemoryAudio,
        notifier: MemoryNotifier,
    }

    fn harness(config: AppConfig, store: KeyValueStore) -> Harness {
        let router = FetchRouter::new(&config, CacheStorage::in_memory().unwrap()).unwrap();
        let notifier = MemoryNotifier::new();
        let (worker, _) = Worker::spawn(
            router,
            MemoryNetwork::new(),
            Box::new(notifier.clone()),
            Box::new(MemoryWindowHost::new()),
        );
        let feed = PositionFeed::new();
        let audio = MemoryAudio::new();
        let (session, _) = Session::spawn(
            &config,
            Box::new(audio.clone()),
            Arc::new(feed.clone()),
            store,
            &worker,
        )
        .unwrap();
        Harness {
            session,
            worker,
            feed,
            audio,
            notifier,
        }
    }

    fn default_harness() -> Harness {
        harness(AppConfig::default(), KeyValueStore::in_memory().unwrap())
    }

    // 0.009 degrees of latitude is about 1 km from the default center
    const OUTSIDE: (f64, f64) = (40.4258, -3.7038);
    const INSIDE: (f64, f64) = (40.4168, -3.7038);

    #[tokio::test(start_paused = true)]
    async fn test_zone_entry_rings_once_and_notifies() {
        let h = default_harness();
        let mut status = h.session.watch_status();

        h.feed.push_fix(OUTSIDE.0, OUTSIDE.1);
        h.feed.push_fix(INSIDE.0, INSIDE.1);
        h.feed.push_fix(INSIDE.0, INSIDE.1);
        status.wait_for(|s| s.alarm.playing).await.unwrap();

        // Flush: a command is handled after the queued samples
        h.session.trajectories().await.unwrap();
        h.worker.activate().await.unwrap();

        assert_eq!(h.audio.calls(), vec!["play sounds/alarma1.mp3 loop=true"]);
        assert_eq!(h.notifier.shown(), 1);
        assert!(h.session.status().alarm.inside_zone);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_stop_after_ten_seconds() {
        let h = default_harness();
        let mut status = h.session.watch_status();

        h.feed.push_fix(INSIDE.0, INSIDE.1);
        status.wait_for(|s| s.alarm.playing).await.unwrap();

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        assert!(h.session.status().alarm.playing);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        h.session.trajectories().await.unwrap();
        let s = h.session.status();
        assert!(!s.alarm.playing);
        // Auto-stop leaves the alarm armed
        assert!(s.alarm.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_policy_rings_until_stopped() {
        let config = AppConfig {
            auto_stop_secs: None,
            ..AppConfig::default()
        };
        let h = harness(config, KeyValueStore::in_memory().unwrap());
        let mut status = h.session.watch_status();

        h.feed.push_fix(INSIDE.0, INSIDE.1);
        status.wait_for(|s| s.alarm.playing).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(h.session.status().alarm.playing);

        h.session.stop_alarm().await.unwrap();
        let s = h.session.status();
        assert!(!s.alarm.playing);
        assert!(s.alarm.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_stop_disables_alarm() {
        let h = default_harness();
        let mut status = h.session.watch_status();

        h.feed.push_fix(INSIDE.0, INSIDE.1);
        status.wait_for(|s| s.alarm.playing).await.unwrap();

        h.worker
            .notification_interaction(NotificationInteraction::Action(STOP_ACTION.to_string()))
            .unwrap();
        let s = status.wait_for(|s| !s.alarm.enabled).await.unwrap().clone();
        assert!(!s.alarm.playing);
        assert!(!s.alarm.inside_zone);

        // Disabled: further entries are ignored
        h.feed.push_fix(OUTSIDE.0, OUTSIDE.1);
        h.feed.push_fix(INSIDE.0, INSIDE.1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!h.session.status().alarm.playing);

        assert!(h.session.toggle_alarm().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_ticks_and_saves() {
        let h = default_harness();
        let mut status = h.session.watch_status();

        h.session.start_recording().await.unwrap();
        assert!(h.session.start_recording().await.is_err());

        h.feed.push_fix(0.0, 0.0);
        h.feed.push_fix(0.0, 1.0);
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        status.wait_for(|s| s.elapsed_seconds == 3).await.unwrap();

        let trajectory = h.session.stop_recording().await.unwrap().unwrap();
        assert_eq!(trajectory.points.len(), 2);
        assert_eq!(trajectory.duration_seconds, 3);
        assert!((trajectory.distance_km - 111.19).abs() < 0.01);

        // No ticks after stop
        tokio::time::sleep(Duration::from_secs(5)).await;
        let s = h.session.status();
        assert!(!s.recording);
        assert_eq!(s.trajectory_count, 1);
        assert_eq!(h.session.trajectories().await.unwrap(), vec![trajectory]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_go_ahead_of_position_backlog() {
        let h = default_harness();
        h.session.start_recording().await.unwrap();
        for i in 0..500 {
            h.feed.push_fix(0.0, i as f64 * 0.001);
        }
        // Served before any of the queued fixes reach the recorder
        assert_eq!(h.session.stop_recording().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degenerate_recording_is_discarded() {
        let h = default_harness();
        h.session.start_recording().await.unwrap();
        h.feed.push_fix(0.0, 0.0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.session.stop_recording().await.unwrap(), None);
        assert!(h.session.trajectories().await.unwrap().is_empty());
        assert!(h.session.stop_recording().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zone_edits() {
        let config = AppConfig {
            persist_zone: true,
            ..AppConfig::default()
        };
        let h = harness(config, KeyValueStore::in_memory().unwrap());

        let zone = h.session.set_zone_radius(500.0).await.unwrap();
        assert_eq!(zone.radius_meters, 500.0);
        assert!(h.session.set_zone_radius(0.0).await.is_err());
        assert!(h.session.set_zone_center(GpsPoint::new(95.0, 0.0)).await.is_err());

        let zone = h.session.set_zone_center(GpsPoint::new(41.3874, 2.1686)).await.unwrap();
        assert_eq!(zone.latitude, 41.3874);
        assert_eq!(zone.radius_meters, 500.0);
        assert_eq!(h.session.status().zone, zone);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loads_persisted_state() {
        let mut store = KeyValueStore::in_memory().unwrap();
        let saved = Trajectory::from_track(
            vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 0.5)],
            60,
            1_760_000_000,
        )
        .unwrap();
        store.save(&[saved.clone()]).unwrap();
        let zone = Zone::new(41.3874, 2.1686, 450.0).unwrap();
        store.save_zone(&zone).unwrap();

        let config = AppConfig {
            persist_zone: true,
            ..AppConfig::default()
        };
        let h = harness(config, store);
        assert_eq!(h.session.trajectories().await.unwrap(), vec![saved]);
        assert_eq!(h.session.status().zone, zone);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tones_and_audio_failure() {
        let h = default_harness();
        let mut status = h.session.watch_status();

        h.session.select_tone(Tone::Alarm3).await.unwrap();
        h.session.preview_tone(Tone::Alarm2).await.unwrap();
        assert_eq!(h.session.status().tone, Tone::Alarm3);

        h.audio.set_failing(true);
        assert!(h.session.preview_tone(Tone::Alarm2).await.is_err());

        // Playback fails but the notification still goes out
        h.feed.push_fix(INSIDE.0, INSIDE.1);
        status.wait_for(|s| s.alarm.inside_zone).await.unwrap();
        h.worker.activate().await.unwrap();
        assert!(!h.session.status().alarm.playing);
        assert_eq!(h.notifier.shown(), 1);
        assert_eq!(h.audio.calls(), vec!["play sounds/alarma2.mp3 loop=false"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown() {
        let h = default_harness();
        h.session.shutdown().await.unwrap();
        assert!(matches!(h.session.toggle_alarm().await, Err(AppError::SessionGone)));
    }
}
