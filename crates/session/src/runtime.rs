// Session runtime
// A worker thread owns the controller. Callers and the engine feed it through
// channels, so every command and engine event is applied in order.

use crate::command::Command;
use crate::controller::PlaybackSessionController;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use podplay_core::{
    AudioFocusArbiter, EngineEvent, Metadata, ObserverSet, PlaybackEngine, PlaybackSnapshot,
    SessionConfig, SessionError, SessionObserver, SessionResult, SnapshotCell, SourceHandle,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// An engine event and the playback epoch it was raised in
type TaggedEvent = (u64, EngineEvent);

enum Request {
    Command {
        command: Command,
        reply: Sender<SessionResult<()>>,
    },
    Shutdown,
}

/// Thread-safe handle to a running playback session.
///
/// Every command is queued and applied by the worker one at a time; the call
/// blocks until its command has been handled. Dropping the handle shuts the
/// session down.
pub struct SessionHandle {
    requests: Sender<Request>,
    /// Checked by the worker between messages
    stopping: Arc<AtomicBool>,
    snapshot: SnapshotCell,
    observers: ObserverSet,
    worker_id: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    pub fn spawn(
        engine: Box<dyn PlaybackEngine>,
        arbiter: Arc<dyn AudioFocusArbiter>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let capacity = config.command_queue_capacity.max(1);
        let mut controller = PlaybackSessionController::new(engine, arbiter, config);
        let snapshot = controller.snapshot_cell();
        let observers = controller.observers().clone();

        let (request_tx, request_rx) = bounded(capacity);
        // Engine events must never block the audio side
        let (event_tx, event_rx) = unbounded();
        let sink_tx = event_tx.clone();
        controller.set_event_sink(Arc::new(move |epoch: u64, event: EngineEvent| {
            if sink_tx.send((epoch, event)).is_err() {
                log::debug!("[session] engine event dropped, session is gone");
            }
        }));

        let stopping = Arc::new(AtomicBool::new(false));
        let worker_stopping = stopping.clone();
        let worker = thread::Builder::new()
            .name("podplay-session".into())
            .spawn(move || run(controller, request_rx, event_rx, event_tx, worker_stopping))
            .map_err(|e| {
                log::error!("[session] failed to spawn worker: {}", e);
                SessionError::Closed
            })?;

        Ok(Self {
            requests: request_tx,
            stopping,
            snapshot,
            observers,
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn play_from_source(&self, source: SourceHandle, metadata: Metadata) -> SessionResult<()> {
        self.send(Command::PlayFromSource { source, metadata })
    }

    pub fn resume(&self) -> SessionResult<()> {
        self.send(Command::Resume)
    }

    pub fn pause(&self) -> SessionResult<()> {
        self.send(Command::Pause)
    }

    pub fn stop(&self) -> SessionResult<()> {
        self.send(Command::Stop)
    }

    pub fn seek_to(&self, position_ms: i64) -> SessionResult<()> {
        self.send(Command::SeekTo(position_ms))
    }

    pub fn change_speed(&self, rate: f32) -> SessionResult<()> {
        self.send(Command::ChangeSpeed(rate))
    }

    /// Queue a command and wait for its result.
    ///
    /// Fails with `Busy` when the queue is full and `Closed` once the worker
    /// has exited. Observers run on the worker thread and must not call back
    /// into the handle; such calls are refused with `Busy`.
    pub fn send(&self, command: Command) -> SessionResult<()> {
        if thread::current().id() == self.worker_id {
            log::warn!("[session] {} issued from an observer callback, refusing", command.name());
            return Err(SessionError::Busy);
        }

        let (reply_tx, reply_rx) = bounded(1);
        let name = command.name();
        match self.requests.try_send(Request::Command {
            command,
            reply: reply_tx,
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("[session] queue full, rejecting {}", name);
                return Err(SessionError::Busy);
            }
            Err(TrySendError::Disconnected(_)) => return Err(SessionError::Closed),
        }

        reply_rx.recv().map_err(|_| SessionError::Closed)?
    }

    /// Latest published snapshot, read without queueing
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.get()
    }

    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.observers.add(observer);
    }

    pub fn observers(&self) -> &ObserverSet {
        &self.observers
    }

    /// Stop the worker, releasing focus and the engine. Idempotent.
    ///
    /// Commands still queued are dropped and their callers get `Closed`.
    /// From an observer callback this returns at once; the worker exits when
    /// the callback returns.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        self.stopping.store(true, Ordering::SeqCst);

        if thread::current().id() == self.worker_id {
            // The worker is inside this callback and cannot drain the queue
            let _ = self.requests.try_send(Request::Shutdown);
            return;
        }

        // Wakes an idle worker. Fails once the worker has seen the flag and
        // dropped the queue.
        let _ = self.requests.send(Request::Shutdown);
        if worker.join().is_err() {
            log::error!("[session] worker panicked");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    mut controller: PlaybackSessionController,
    requests: Receiver<Request>,
    events: Receiver<TaggedEvent>,
    // Keeps the event channel connected while the engine is replaced
    _events_tx: Sender<TaggedEvent>,
    stopping: Arc<AtomicBool>,
) {
    log::info!("[session] worker started");

    while !stopping.load(Ordering::SeqCst) {
        select! {
            recv(requests) -> request => match request {
                Ok(Request::Command { command, reply }) => {
                    let name = command.name();
                    let result = controller.handle(command);
                    if let Err(err) = &result {
                        log::warn!("[session] {} failed: {}", name, err);
                    }
                    // The caller may have given up waiting
                    let _ = reply.send(result);
                }
                Ok(Request::Shutdown) | Err(_) => break,
            },
            recv(events) -> event => {
                if let Ok((epoch, event)) = event {
                    log::debug!("[session] engine event {:?} (epoch {})", event, epoch);
                    controller.handle_engine_event(epoch, event);
                }
            }
        }
    }

    controller.teardown();
    log::info!("[session] worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EngineControl, FakeArbiter, FakeEngine, RecordingObserver};
    use podplay_core::PlaybackState;
    use std::sync::Weak;
    use std::time::{Duration, Instant};

    fn spawn_session(config: SessionConfig) -> (SessionHandle, EngineControl, Arc<FakeArbiter>) {
        let (engine, control) = FakeEngine::new();
        let arbiter = FakeArbiter::granting();
        let handle = SessionHandle::spawn(Box::new(engine), arbiter.clone(), config).unwrap();
        (handle, control, arbiter)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn episode() -> Metadata {
        Metadata::new("Episode 1", "PodPlay Weekly")
    }

    #[test]
    fn test_commands_apply_in_order() {
        let (handle, control, arbiter) = spawn_session(SessionConfig::default());
        let observer = RecordingObserver::new();
        handle.add_observer(observer.clone());

        handle
            .play_from_source(SourceHandle::new("ep1"), episode())
            .unwrap();
        handle.seek_to(15_000).unwrap();
        handle.pause().unwrap();

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Paused);
        assert_eq!(snapshot.position_ms, 15_000);
        assert!(!control.is_playing());
        assert!(!arbiter.is_held());
        assert_eq!(observer.count_paused(), 1);
    }

    #[test]
    fn test_errors_are_returned_to_caller() {
        let (handle, control, _arbiter) = spawn_session(SessionConfig::default());
        control.script(|log| log.fail_load = true);

        let result = handle.play_from_source(SourceHandle::new("ep1"), episode());

        assert!(matches!(result, Err(SessionError::EngineLoadFailed(_))));
        assert_eq!(handle.snapshot().state, PlaybackState::Idle);
    }

    #[test]
    fn test_engine_completion_reaches_worker() {
        let (handle, control, arbiter) = spawn_session(SessionConfig::default());
        let observer = RecordingObserver::new();
        handle.add_observer(observer.clone());
        handle
            .play_from_source(SourceHandle::new("ep1"), episode())
            .unwrap();

        assert!(control.finish_track());

        assert!(wait_for(|| handle.snapshot().state == PlaybackState::Paused));
        assert!(wait_for(|| observer.count_paused() == 1));
        assert!(!arbiter.is_held());
    }

    #[test]
    fn test_shutdown_releases_focus_and_closes() {
        let (handle, control, arbiter) = spawn_session(SessionConfig::default());
        handle
            .play_from_source(SourceHandle::new("ep1"), episode())
            .unwrap();

        handle.shutdown();

        assert!(!arbiter.is_held());
        assert!(!control.is_playing());
        assert_eq!(handle.snapshot().state, PlaybackState::Idle);
        assert_eq!(handle.pause(), Err(SessionError::Closed));

        // Second shutdown is a no-op
        handle.shutdown();
    }

    #[test]
    fn test_drop_tears_down_session() {
        let (handle, _control, arbiter) = spawn_session(SessionConfig::default());
        handle
            .play_from_source(SourceHandle::new("ep1"), episode())
            .unwrap();
        assert!(arbiter.is_held());

        drop(handle);

        assert!(!arbiter.is_held());
    }

    /// Blocks the worker inside the first state change until released
    struct Gate {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl SessionObserver for Gate {
        fn on_state_changed(&self, _snapshot: &PlaybackSnapshot) {
            let _ = self.entered.send(());
            let _ = self.release.recv();
        }

        fn on_paused(&self, _snapshot: &PlaybackSnapshot) {}

        fn on_stopped(&self) {}
    }

    #[test]
    fn test_full_queue_reports_busy() {
        let (handle, _control, _arbiter) =
            spawn_session(SessionConfig::default().with_command_queue_capacity(1));
        let handle = Arc::new(handle);

        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        handle.add_observer(Arc::new(Gate {
            entered: entered_tx,
            release: release_rx,
        }));

        let player = {
            let handle = handle.clone();
            thread::spawn(move || handle.play_from_source(SourceHandle::new("ep1"), episode()))
        };
        entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("worker reached the observer");

        let pauser = {
            let handle = handle.clone();
            thread::spawn(move || handle.pause())
        };
        assert!(wait_for(|| handle.requests.len() == 1));

        assert_eq!(handle.seek_to(0), Err(SessionError::Busy));

        // Let the play and pause transitions through
        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        assert_eq!(player.join().unwrap(), Ok(()));
        assert_eq!(pauser.join().unwrap(), Ok(()));
        assert_eq!(handle.snapshot().state, PlaybackState::Paused);
    }

    /// Shuts the session down from inside its first state change, once let go
    struct ShutdownOnRelease {
        handle: Mutex<Weak<SessionHandle>>,
        entered: Sender<()>,
        release: Receiver<()>,
        returned: Sender<()>,
        fired: AtomicBool,
    }

    impl SessionObserver for ShutdownOnRelease {
        fn on_state_changed(&self, _snapshot: &PlaybackSnapshot) {
            if self.fired.swap(true, Ordering::SeqCst) {
                return;
            }
            let _ = self.entered.send(());
            let _ = self.release.recv();
            if let Some(handle) = self.handle.lock().upgrade() {
                handle.shutdown();
                let _ = self.returned.send(());
            }
        }

        fn on_paused(&self, _snapshot: &PlaybackSnapshot) {}

        fn on_stopped(&self) {}
    }

    #[test]
    fn test_shutdown_from_callback_with_full_queue() {
        let (handle, control, arbiter) =
            spawn_session(SessionConfig::default().with_command_queue_capacity(1));
        let handle = Arc::new(handle);

        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        let (returned_tx, returned_rx) = unbounded();
        handle.add_observer(Arc::new(ShutdownOnRelease {
            handle: Mutex::new(Arc::downgrade(&handle)),
            entered: entered_tx,
            release: release_rx,
            returned: returned_tx,
            fired: AtomicBool::new(false),
        }));

        let player = {
            let handle = handle.clone();
            thread::spawn(move || handle.play_from_source(SourceHandle::new("ep1"), episode()))
        };
        entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("worker reached the observer");

        let pauser = {
            let handle = handle.clone();
            thread::spawn(move || handle.pause())
        };
        assert!(wait_for(|| handle.requests.len() == 1));

        release_tx.send(()).unwrap();
        returned_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("shutdown returned inside the callback");

        // The command in flight completes, the queued one is dropped
        assert_eq!(player.join().unwrap(), Ok(()));
        assert_eq!(pauser.join().unwrap(), Err(SessionError::Closed));
        assert!(wait_for(|| handle.snapshot().state == PlaybackState::Idle));
        assert!(wait_for(|| !arbiter.is_held()));
        assert!(!control.is_playing());
        assert_eq!(handle.resume(), Err(SessionError::Closed));
    }

    /// Tries to issue a command from inside a callback
    struct Reentrant {
        handle: Mutex<Option<Arc<SessionHandle>>>,
        result: Mutex<Option<SessionResult<()>>>,
    }

    impl SessionObserver for Reentrant {
        fn on_state_changed(&self, _snapshot: &PlaybackSnapshot) {
            if let Some(handle) = self.handle.lock().take() {
                *self.result.lock() = Some(handle.pause());
            }
        }

        fn on_paused(&self, _snapshot: &PlaybackSnapshot) {}

        fn on_stopped(&self) {}
    }

    #[test]
    fn test_commands_from_callbacks_are_refused() {
        let (handle, _control, _arbiter) = spawn_session(SessionConfig::default());
        let handle = Arc::new(handle);
        let observer = Arc::new(Reentrant {
            handle: Mutex::new(Some(handle.clone())),
            result: Mutex::new(None),
        });
        handle.add_observer(observer.clone());

        handle
            .play_from_source(SourceHandle::new("ep1"), episode())
            .unwrap();

        assert_eq!(*observer.result.lock(), Some(Err(SessionError::Busy)));
        assert_eq!(handle.snapshot().state, PlaybackState::Playing);
        handle.shutdown();
    }
}
