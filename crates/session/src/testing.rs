// Scripted collaborators for controller and runtime tests

use parking_lot::Mutex;
use podplay_core::{
    AudioError, AudioFocusArbiter, EngineEvent, EngineEventSink, FocusDenied, FocusToken,
    Metadata, PlaybackEngine, PlaybackSnapshot, PlaybackState, Result, SessionObserver,
    SnapshotCell, SourceHandle,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const EPISODE_DURATION_MS: u64 = 120_000;

/// What the fake engine did and what it is scripted to do next
#[derive(Default)]
pub struct EngineLog {
    pub calls: Vec<&'static str>,
    pub loads: Vec<SourceHandle>,
    pub seeks: Vec<u64>,
    pub speeds: Vec<f32>,
    /// Session state seen from inside each prepare
    pub states_during_prepare: Vec<PlaybackState>,

    pub fail_load: bool,
    pub fail_prepare: bool,
    pub fail_play: bool,
    /// Number of upcoming `set_speed` calls to reject
    pub speed_rejections: usize,
}

impl EngineLog {
    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

#[derive(Default)]
struct EngineModel {
    loaded: Option<SourceHandle>,
    prepared: bool,
    playing: bool,
    position_ms: u64,
    speed: f32,
}

/// Shared view of a [`FakeEngine`] that stays with the test
#[derive(Clone, Default)]
pub struct EngineControl {
    log: Arc<Mutex<EngineLog>>,
    model: Arc<Mutex<EngineModel>>,
    sink: Arc<Mutex<Option<EngineEventSink>>>,
    watched: Arc<Mutex<Option<SnapshotCell>>>,
}

impl EngineControl {
    pub fn log(&self) -> parking_lot::MutexGuard<'_, EngineLog> {
        self.log.lock()
    }

    pub fn script(&self, f: impl FnOnce(&mut EngineLog)) {
        f(&mut self.log.lock());
    }

    /// Let prepare record the session state it runs under
    pub fn watch(&self, cell: SnapshotCell) {
        *self.watched.lock() = Some(cell);
    }

    pub fn set_position(&self, position_ms: u64) {
        self.model.lock().position_ms = position_ms;
    }

    pub fn is_playing(&self) -> bool {
        self.model.lock().playing
    }

    pub fn speed(&self) -> f32 {
        self.model.lock().speed
    }

    /// Simulate the end of the track, delivered through the installed sink
    pub fn finish_track(&self) -> bool {
        {
            let mut model = self.model.lock();
            model.playing = false;
            model.position_ms = EPISODE_DURATION_MS;
        }
        self.emit(EngineEvent::Completed)
    }

    /// Raise an event through the installed sink without touching the model
    pub fn emit(&self, event: EngineEvent) -> bool {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }
}

pub struct FakeEngine {
    control: EngineControl,
}

impl FakeEngine {
    pub fn new() -> (Self, EngineControl) {
        let control = EngineControl::default();
        control.model.lock().speed = 1.0;
        (Self { control: control.clone() }, control)
    }

    fn record(&self, call: &'static str) {
        self.control.log.lock().calls.push(call);
    }
}

impl PlaybackEngine for FakeEngine {
    fn load(&mut self, source: &SourceHandle) -> Result<()> {
        self.record("load");
        let mut log = self.control.log.lock();
        log.loads.push(source.clone());
        if log.fail_load {
            return Err(AudioError::LoadError(format!("cannot open {}", source)));
        }
        let mut model = self.control.model.lock();
        model.loaded = Some(source.clone());
        model.prepared = false;
        model.playing = false;
        model.position_ms = 0;
        Ok(())
    }

    fn prepare(&mut self, _timeout: Duration) -> Result<()> {
        self.record("prepare");
        if let Some(cell) = self.control.watched.lock().as_ref() {
            self.control.log.lock().states_during_prepare.push(cell.state());
        }
        if self.control.log.lock().fail_prepare {
            return Err(AudioError::Timeout("prepare stalled".into()));
        }
        let mut model = self.control.model.lock();
        if model.loaded.is_none() {
            return Err(AudioError::InvalidState("nothing loaded".into()));
        }
        model.prepared = true;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.record("play");
        if self.control.log.lock().fail_play {
            return Err(AudioError::DeviceError("output unavailable".into()));
        }
        let mut model = self.control.model.lock();
        if !model.prepared {
            return Err(AudioError::InvalidState("not prepared".into()));
        }
        model.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.record("pause");
        self.control.model.lock().playing = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record("stop");
        let mut model = self.control.model.lock();
        model.playing = false;
        model.prepared = false;
        Ok(())
    }

    fn reset(&mut self) {
        self.record("reset");
        let mut model = self.control.model.lock();
        *model = EngineModel {
            speed: 1.0,
            ..Default::default()
        };
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.record("seek_to");
        self.control.log.lock().seeks.push(position_ms);
        self.control.model.lock().position_ms = position_ms;
        Ok(())
    }

    fn set_speed(&mut self, rate: f32) -> Result<()> {
        self.record("set_speed");
        let mut log = self.control.log.lock();
        log.speeds.push(rate);
        if log.speed_rejections > 0 {
            log.speed_rejections -= 1;
            return Err(AudioError::RateChangeRejected("mid-stream".into()));
        }
        self.control.model.lock().speed = rate;
        Ok(())
    }

    fn supports_speed(&self, rate: f32) -> bool {
        (0.25..=4.0).contains(&rate)
    }

    fn current_position(&self) -> u64 {
        self.control.model.lock().position_ms
    }

    fn duration(&self) -> u64 {
        if self.control.model.lock().loaded.is_some() {
            EPISODE_DURATION_MS
        } else {
            0
        }
    }

    fn is_playing(&self) -> bool {
        self.control.model.lock().playing
    }

    fn set_event_sink(&mut self, sink: EngineEventSink) {
        *self.control.sink.lock() = Some(sink);
    }
}

/// Arbiter that grants or denies on demand and counts traffic
#[derive(Default)]
pub struct FakeArbiter {
    deny: AtomicBool,
    next_id: AtomicU64,
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
    live: Mutex<Option<u64>>,
}

impl FakeArbiter {
    pub fn granting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.live.lock().is_some()
    }
}

impl AudioFocusArbiter for FakeArbiter {
    fn acquire(&self) -> std::result::Result<FocusToken, FocusDenied> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(FocusDenied {
                holder: Some("other-app".into()),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        *self.live.lock() = Some(id);
        Ok(FocusToken::new(id))
    }

    fn release(&self, token: FocusToken) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        let mut live = self.live.lock();
        if *live == Some(token.id()) {
            *live = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    StateChanged(PlaybackSnapshot),
    Paused(PlaybackSnapshot),
    Stopped,
    Metadata(Metadata),
}

/// Observer that keeps every notification
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().clone()
    }

    pub fn state_changes(&self) -> Vec<PlaybackSnapshot> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Observed::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn count_paused(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, Observed::Paused(_)))
            .count()
    }

    pub fn count_stopped(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, Observed::Stopped))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state_changed(&self, snapshot: &PlaybackSnapshot) {
        self.events.lock().push(Observed::StateChanged(*snapshot));
    }

    fn on_paused(&self, snapshot: &PlaybackSnapshot) {
        self.events.lock().push(Observed::Paused(*snapshot));
    }

    fn on_stopped(&self) {
        self.events.lock().push(Observed::Stopped);
    }

    fn on_metadata_changed(&self, metadata: &Metadata) {
        self.events.lock().push(Observed::Metadata(metadata.clone()));
    }
}
