// Playback session state machine
// Serializes commands against one engine and one focus grant:
// Idle -> Preparing -> Playing <-> Paused, Stopped from Playing/Paused.

use crate::command::Command;
use crate::session::Session;
use podplay_core::{
    AudioError, AudioFocusArbiter, EngineEvent, EngineEventSink, Metadata, ObserverSet,
    PlaybackEngine, PlaybackSnapshot, PlaybackState, SessionConfig, SessionError,
    SessionResult, SnapshotCell, SourceHandle,
};
use std::sync::Arc;

/// Rates closer than this to the engine default are not re-applied
const SPEED_EPSILON: f32 = 0.001;

/// Receives engine events tagged with the playback epoch they were raised in
pub type SessionEventSink = Arc<dyn Fn(u64, EngineEvent) + Send + Sync>;

pub struct PlaybackSessionController {
    session: Session,
    state: PlaybackState,
    speed: f32,
    engine: Box<dyn PlaybackEngine>,
    arbiter: Arc<dyn AudioFocusArbiter>,
    observers: ObserverSet,
    snapshot: SnapshotCell,
    config: SessionConfig,
    /// Bumped whenever playback leaves Playing or the engine is reset;
    /// events from an earlier epoch belong to playback that no longer exists
    epoch: u64,
    event_sink: Option<SessionEventSink>,
}

impl PlaybackSessionController {
    pub fn new(
        engine: Box<dyn PlaybackEngine>,
        arbiter: Arc<dyn AudioFocusArbiter>,
        config: SessionConfig,
    ) -> Self {
        let speed = config.default_speed;
        Self {
            session: Session::default(),
            state: PlaybackState::Idle,
            speed,
            engine,
            arbiter,
            observers: ObserverSet::new(),
            snapshot: SnapshotCell::new(PlaybackSnapshot::idle(speed)),
            config,
            epoch: 0,
            event_sink: None,
        }
    }

    pub fn observers(&self) -> &ObserverSet {
        &self.observers
    }

    /// Shared cell holding the latest snapshot
    pub fn snapshot_cell(&self) -> SnapshotCell {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.get()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Current playback epoch, carried by every event the engine raises
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn set_event_sink(&mut self, sink: SessionEventSink) {
        self.event_sink = Some(sink);
        self.install_event_sink();
    }

    pub fn handle(&mut self, command: Command) -> SessionResult<()> {
        match command {
            Command::PlayFromSource { source, metadata } => self.play_from_source(source, metadata),
            Command::Resume => self.resume(),
            Command::Pause => self.pause(),
            Command::Stop => self.stop(),
            Command::SeekTo(position_ms) => self.seek_to(position_ms),
            Command::ChangeSpeed(rate) => self.change_speed(rate),
        }
    }

    /// Play `source`. The engine is only reloaded when the source differs
    /// from the current one; otherwise just metadata and focus are refreshed.
    pub fn play_from_source(&mut self, source: SourceHandle, metadata: Metadata) -> SessionResult<()> {
        log::info!("[session] play_from_source {}", source);

        // Focus first: a denial must leave the session untouched
        self.ensure_focus()?;

        if self.session.current_source.as_ref() == Some(&source) {
            self.session.is_new_source = false;
            self.session.pending_metadata = None;
            self.attach_metadata(metadata);
        } else {
            self.session.set_new_source(source, metadata);
        }

        self.start()
    }

    pub fn resume(&mut self) -> SessionResult<()> {
        log::info!("[session] resume");

        if !self.session.has_source() {
            log::debug!("[session] resume ignored: no source loaded");
            return Ok(());
        }
        if self.state == PlaybackState::Playing && self.engine.is_playing() {
            return Ok(());
        }

        self.ensure_focus()?;
        self.start()
    }

    pub fn pause(&mut self) -> SessionResult<()> {
        log::info!("[session] pause");

        if self.state != PlaybackState::Playing {
            log::debug!("[session] pause ignored in state {}", self.state);
            return Ok(());
        }

        self.release_focus();
        if self.engine.is_playing() {
            if let Err(err) = self.engine.pause() {
                log::warn!("[session] engine pause failed: {}", err);
            }
        }

        self.enter_paused();
        Ok(())
    }

    pub fn stop(&mut self) -> SessionResult<()> {
        log::info!("[session] stop");

        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            log::debug!("[session] stop ignored in state {}", self.state);
            return Ok(());
        }

        self.release_focus();
        self.session.active = false;
        if self.engine.is_playing() {
            if let Err(err) = self.engine.stop() {
                log::warn!("[session] engine stop failed: {}", err);
            }
            self.session.needs_prepare = true;
        }
        self.begin_epoch();

        self.transition(PlaybackState::Stopped);
        self.observers.stopped();
        Ok(())
    }

    /// Seek within the current source, clamping to `[0, duration]`
    pub fn seek_to(&mut self, position_ms: i64) -> SessionResult<()> {
        log::info!("[session] seek_to {} ms", position_ms);

        if !self.session.has_source() {
            log::debug!("[session] seek ignored: no source loaded");
            return Ok(());
        }

        let target = clamp_position(position_ms, self.engine.duration());
        if target as i64 != position_ms {
            log::warn!("[session] seek to {} ms out of range, clamped to {} ms", position_ms, target);
        }

        if let Err(err) = self.engine.seek_to(target) {
            return Err(self.fail(err));
        }

        self.transition(self.state);
        Ok(())
    }

    /// Change the playback rate, rebuilding playback when the engine refuses
    /// to change it in place
    pub fn change_speed(&mut self, rate: f32) -> SessionResult<()> {
        log::info!("[session] change_speed {}", rate);

        if !self.session.has_source() {
            log::debug!("[session] speed change ignored: no source loaded");
            return Ok(());
        }
        if !rate.is_finite() || rate <= 0.0 || !self.engine.supports_speed(rate) {
            return Err(SessionError::SpeedChangeFailed(format!(
                "rate {} not supported by engine",
                rate
            )));
        }

        let position_ms = self.engine.current_position();
        let was_playing = self.state == PlaybackState::Playing;

        if let Err(err) = self.engine.set_speed(rate) {
            log::warn!(
                "[session] in-place speed change to {} failed ({}), rebuilding at {} ms",
                rate,
                err,
                position_ms
            );
            if let Err(err) = self.rebuild_with_speed(rate, position_ms, was_playing) {
                return Err(self.fail(err));
            }
        }

        self.speed = rate;
        self.transition(self.state);
        Ok(())
    }

    /// Apply an event raised by the engine during `epoch`
    pub fn handle_engine_event(&mut self, epoch: u64, event: EngineEvent) {
        if epoch != self.epoch {
            log::debug!(
                "[session] dropping {:?} from epoch {} (now {})",
                event,
                epoch,
                self.epoch
            );
            return;
        }
        match event {
            EngineEvent::Completed => {
                if self.state != PlaybackState::Playing {
                    log::debug!("[session] completion ignored in state {}", self.state);
                    return;
                }
                log::info!("[session] playback completed");
                if self.config.release_focus_on_completion {
                    self.release_focus();
                }
                self.enter_paused();
            }
            EngineEvent::Error { message } => {
                if !self.session.has_source() {
                    return;
                }
                let _ = self.fail(AudioError::PlaybackError(message));
            }
        }
    }

    /// Release everything the session holds. Safe to call more than once.
    pub fn teardown(&mut self) {
        let was_presenting = matches!(self.state, PlaybackState::Playing | PlaybackState::Paused);

        self.release_focus();
        if self.session.has_source() {
            log::info!("[session] tearing down");
            if self.engine.is_playing() {
                if let Err(err) = self.engine.stop() {
                    log::warn!("[session] engine stop failed during teardown: {}", err);
                }
            }
            self.reset_engine();
        }
        self.session.clear_source();

        if self.state != PlaybackState::Idle {
            self.transition(PlaybackState::Idle);
        }
        if was_presenting {
            self.observers.stopped();
        }
    }

    fn ensure_focus(&mut self) -> SessionResult<()> {
        if self.session.focus.is_some() {
            return Ok(());
        }
        match self.arbiter.acquire() {
            Ok(token) => {
                self.session.focus = Some(token);
                Ok(())
            }
            Err(denied) => {
                log::info!("[session] play refused: {}", denied);
                Err(SessionError::FocusDenied)
            }
        }
    }

    fn release_focus(&mut self) {
        if let Some(token) = self.session.focus.take() {
            self.arbiter.release(token);
        }
    }

    fn start(&mut self) -> SessionResult<()> {
        self.session.active = true;

        if let Err(err) = self.prepare_if_needed() {
            return Err(self.fail(err));
        }

        if !self.engine.is_playing() {
            if let Err(err) = self.engine.play() {
                return Err(self.fail(err));
            }
            self.transition(PlaybackState::Playing);
        }
        Ok(())
    }

    fn prepare_if_needed(&mut self) -> podplay_core::Result<()> {
        if self.session.is_new_source {
            self.session.is_new_source = false;
            let source = self
                .session
                .current_source
                .clone()
                .ok_or_else(|| AudioError::InvalidState("no source to load".into()))?;

            self.transition(PlaybackState::Preparing);
            self.reset_engine();
            self.engine.load(&source)?;
            self.engine.prepare(self.config.prepare_timeout)?;
            self.session.needs_prepare = false;
            self.reapply_speed();

            if let Some(metadata) = self.session.pending_metadata.take() {
                self.attach_metadata(metadata);
            }
        } else if self.session.needs_prepare {
            self.transition(PlaybackState::Preparing);
            self.engine.prepare(self.config.prepare_timeout)?;
            self.session.needs_prepare = false;
        }
        Ok(())
    }

    // A fresh load starts at the engine's default rate
    fn reapply_speed(&mut self) {
        if (self.speed - 1.0).abs() < SPEED_EPSILON {
            return;
        }
        if let Err(err) = self.engine.set_speed(self.speed) {
            log::warn!("[session] could not keep speed {} on new source: {}", self.speed, err);
            self.speed = 1.0;
        }
    }

    fn rebuild_with_speed(
        &mut self,
        rate: f32,
        position_ms: u64,
        was_playing: bool,
    ) -> podplay_core::Result<()> {
        let source = self
            .session
            .current_source
            .clone()
            .ok_or_else(|| AudioError::InvalidState("no source to reload".into()))?;

        self.reset_engine();
        self.engine.load(&source)?;
        self.engine.prepare(self.config.prepare_timeout)?;
        self.session.needs_prepare = false;
        self.engine.set_speed(rate)?;
        self.engine.seek_to(position_ms)?;
        if was_playing {
            self.engine.play()?;
        }

        log::info!("[session] playback rebuilt at {} ms, speed {}", position_ms, rate);
        Ok(())
    }

    fn reset_engine(&mut self) {
        self.engine.reset();
        self.begin_epoch();
    }

    // Runs after the engine has paused, stopped or dropped its playback, so
    // nothing it raises from here on carries the old epoch
    fn begin_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.install_event_sink();
    }

    fn install_event_sink(&mut self) {
        let Some(sink) = self.event_sink.clone() else {
            return;
        };
        let epoch = self.epoch;
        let tagged: EngineEventSink = Arc::new(move |event: EngineEvent| sink(epoch, event));
        self.engine.set_event_sink(tagged);
    }

    fn attach_metadata(&mut self, mut metadata: Metadata) {
        let duration_ms = self.engine.duration();
        if duration_ms > 0 {
            metadata.duration_ms = Some(duration_ms);
        }
        self.observers.metadata_changed(&metadata);
        self.session.metadata = Some(metadata);
    }

    fn enter_paused(&mut self) {
        self.begin_epoch();
        self.transition(PlaybackState::Paused);
        let snapshot = self.snapshot.get();
        self.observers.paused(&snapshot);
    }

    /// Fall back to idle after an engine failure
    fn fail(&mut self, err: AudioError) -> SessionError {
        log::error!("[session] engine failure: {}", err);

        self.release_focus();
        self.reset_engine();
        self.session.clear_source();
        self.transition(PlaybackState::Idle);
        self.observers.stopped();

        SessionError::from(err)
    }

    fn transition(&mut self, next: PlaybackState) {
        if !self.state.can_transition_to(next) {
            log::warn!("[session] unexpected transition {} -> {}", self.state, next);
        }
        self.state = next;

        let snapshot = self.compute_snapshot();
        self.snapshot.set(snapshot);
        if next.is_published() {
            self.observers.state_changed(&snapshot);
        }
    }

    fn compute_snapshot(&self) -> PlaybackSnapshot {
        if self.state == PlaybackState::Idle {
            return PlaybackSnapshot::idle(self.speed);
        }
        PlaybackSnapshot {
            state: self.state,
            position_ms: self.engine.current_position(),
            duration_ms: self.engine.duration(),
            speed: self.speed,
            actions: self.state.available_actions(),
        }
    }
}

impl Drop for PlaybackSessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn clamp_position(position_ms: i64, duration_ms: u64) -> u64 {
    let position = position_ms.max(0) as u64;
    if duration_ms > 0 {
        position.min(duration_ms)
    } else {
        position
    }
}
