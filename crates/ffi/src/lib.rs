// C ABI for PodPlay playback sessions
// Sessions live in a process-wide registry keyed by id. Every entry point
// returns a status code instead of unwinding across the boundary.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use podplay_core::{Metadata, PlaybackSnapshot, PlaybackState, SessionConfig, SessionError};
use podplay_engine_desktop::DesktopEngine;
use podplay_focus::FocusRegistry;
use podplay_session::{SessionHandle, SessionObserver, SourceHandle};
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Once};

pub const PODPLAY_OK: i32 = 0;
pub const PODPLAY_ERR_INVALID: i32 = -1;
pub const PODPLAY_ERR_FOCUS_DENIED: i32 = -2;
pub const PODPLAY_ERR_ENGINE_LOAD_FAILED: i32 = -3;
pub const PODPLAY_ERR_SPEED_CHANGE_FAILED: i32 = -4;
pub const PODPLAY_ERR_BUSY: i32 = -5;
pub const PODPLAY_ERR_CLOSED: i32 = -6;

static SESSION_REGISTRY: Lazy<Mutex<HashMap<i64, Arc<SessionHandle>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_SESSION_ID: AtomicI64 = AtomicI64::new(1);
static INIT_LOGGER: Once = Once::new();

fn init_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder()
            .is_test(false)
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .try_init();
    });
}

/// Snapshot as seen from C
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PodplaySnapshot {
    pub state: i32,
    pub position_ms: i64,
    pub duration_ms: i64,
    pub speed: f32,
    /// Bitmask of available actions
    pub actions: u32,
}

impl From<&PlaybackSnapshot> for PodplaySnapshot {
    fn from(snapshot: &PlaybackSnapshot) -> Self {
        Self {
            state: state_code(snapshot.state),
            position_ms: snapshot.position_ms as i64,
            duration_ms: snapshot.duration_ms as i64,
            speed: snapshot.speed,
            actions: snapshot.actions.bits(),
        }
    }
}

/// Callbacks registered by the host. Any of them may be null.
///
/// Callbacks run on the session worker thread; they must not call back into
/// the same session's commands (those return `PODPLAY_ERR_BUSY`).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PodplayObserver {
    pub user_data: *mut c_void,
    pub on_state_changed: Option<extern "C" fn(*mut c_void, *const PodplaySnapshot)>,
    pub on_paused: Option<extern "C" fn(*mut c_void, *const PodplaySnapshot)>,
    pub on_stopped: Option<extern "C" fn(*mut c_void)>,
}

struct CObserver {
    callbacks: PodplayObserver,
}

// The host owns `user_data` and promises it may be used from the worker thread
unsafe impl Send for CObserver {}
unsafe impl Sync for CObserver {}

impl SessionObserver for CObserver {
    fn on_state_changed(&self, snapshot: &PlaybackSnapshot) {
        if let Some(callback) = self.callbacks.on_state_changed {
            let snapshot = PodplaySnapshot::from(snapshot);
            callback(self.callbacks.user_data, &snapshot);
        }
    }

    fn on_paused(&self, snapshot: &PlaybackSnapshot) {
        if let Some(callback) = self.callbacks.on_paused {
            let snapshot = PodplaySnapshot::from(snapshot);
            callback(self.callbacks.user_data, &snapshot);
        }
    }

    fn on_stopped(&self) {
        if let Some(callback) = self.callbacks.on_stopped {
            callback(self.callbacks.user_data);
        }
    }
}

fn state_code(state: PlaybackState) -> i32 {
    match state {
        PlaybackState::Idle => 0,
        PlaybackState::Preparing => 1,
        PlaybackState::Playing => 2,
        PlaybackState::Paused => 3,
        PlaybackState::Stopped => 4,
    }
}

fn error_code(err: &SessionError) -> i32 {
    match err {
        SessionError::FocusDenied => PODPLAY_ERR_FOCUS_DENIED,
        SessionError::EngineLoadFailed(_) => PODPLAY_ERR_ENGINE_LOAD_FAILED,
        SessionError::SpeedChangeFailed(_) => PODPLAY_ERR_SPEED_CHANGE_FAILED,
        SessionError::Busy => PODPLAY_ERR_BUSY,
        SessionError::Closed => PODPLAY_ERR_CLOSED,
    }
}

fn to_code(result: Result<(), SessionError>) -> i32 {
    match result {
        Ok(()) => PODPLAY_OK,
        Err(err) => {
            log::warn!("[ffi] {}", err);
            error_code(&err)
        }
    }
}

// The registry lock is never held while a command runs: commands block on the
// worker, and observers running there may call the getters.
fn session(id: i64) -> Option<Arc<SessionHandle>> {
    let found = SESSION_REGISTRY.lock().get(&id).cloned();
    if found.is_none() {
        log::error!("[ffi] unknown session id {}", id);
    }
    found
}

fn with_session(id: i64, f: impl FnOnce(&SessionHandle) -> Result<(), SessionError>) -> i32 {
    match session(id) {
        Some(handle) => to_code(f(&handle)),
        None => PODPLAY_ERR_INVALID,
    }
}

fn snapshot_of(id: i64) -> Option<PlaybackSnapshot> {
    session(id).map(|handle| handle.snapshot())
}

/// Read an optional C string. `Err` means the bytes were not UTF-8.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn optional_str(ptr: *const c_char) -> Result<Option<String>, ()> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|_| ())
}

#[no_mangle]
pub extern "C" fn podplay_session_create() -> i64 {
    init_logging();
    let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);

    let engine = Box::new(DesktopEngine::default());
    let arbiter = Arc::new(FocusRegistry::global().client(format!("session-{}", id)));
    match SessionHandle::spawn(engine, arbiter, SessionConfig::default()) {
        Ok(handle) => {
            SESSION_REGISTRY.lock().insert(id, Arc::new(handle));
            log::info!("[ffi] created session {}", id);
            id
        }
        Err(err) => {
            log::error!("[ffi] failed to create session: {}", err);
            PODPLAY_ERR_INVALID as i64
        }
    }
}

/// Replace the session's observer with `observer`
#[no_mangle]
pub extern "C" fn podplay_session_set_observer(id: i64, observer: PodplayObserver) -> i32 {
    match session(id) {
        Some(handle) => {
            handle.observers().clear();
            handle.add_observer(Arc::new(CObserver {
                callbacks: observer,
            }));
            PODPLAY_OK
        }
        None => PODPLAY_ERR_INVALID,
    }
}

/// # Safety
/// `uri` must be a valid NUL-terminated string. `title`, `artist` and
/// `artwork_ref` must each be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn podplay_session_play_from_source(
    id: i64,
    uri: *const c_char,
    title: *const c_char,
    artist: *const c_char,
    artwork_ref: *const c_char,
) -> i32 {
    let (Ok(Some(uri)), Ok(title), Ok(artist), Ok(artwork_ref)) = (
        optional_str(uri),
        optional_str(title),
        optional_str(artist),
        optional_str(artwork_ref),
    ) else {
        log::error!("[ffi] play_from_source: missing uri or invalid UTF-8");
        return PODPLAY_ERR_INVALID;
    };

    let metadata = Metadata {
        title,
        artist,
        artwork_ref,
        duration_ms: None,
    };
    with_session(id, |s| s.play_from_source(SourceHandle::new(uri), metadata))
}

#[no_mangle]
pub extern "C" fn podplay_session_resume(id: i64) -> i32 {
    with_session(id, |s| s.resume())
}

#[no_mangle]
pub extern "C" fn podplay_session_pause(id: i64) -> i32 {
    with_session(id, |s| s.pause())
}

#[no_mangle]
pub extern "C" fn podplay_session_stop(id: i64) -> i32 {
    with_session(id, |s| s.stop())
}

#[no_mangle]
pub extern "C" fn podplay_session_seek_to(id: i64, position_ms: i64) -> i32 {
    with_session(id, |s| s.seek_to(position_ms))
}

#[no_mangle]
pub extern "C" fn podplay_session_change_speed(id: i64, rate: f32) -> i32 {
    with_session(id, |s| s.change_speed(rate))
}

#[no_mangle]
pub extern "C" fn podplay_session_get_state(id: i64) -> i32 {
    snapshot_of(id).map_or(PODPLAY_ERR_INVALID, |s| state_code(s.state))
}

#[no_mangle]
pub extern "C" fn podplay_session_get_position(id: i64) -> i64 {
    snapshot_of(id).map_or(-1, |s| s.position_ms as i64)
}

#[no_mangle]
pub extern "C" fn podplay_session_get_duration(id: i64) -> i64 {
    snapshot_of(id).map_or(-1, |s| s.duration_ms as i64)
}

#[no_mangle]
pub extern "C" fn podplay_session_get_speed(id: i64) -> f32 {
    snapshot_of(id).map_or(-1.0, |s| s.speed)
}

/// Shut the session down and forget its id. Safe to call from an observer
/// callback.
#[no_mangle]
pub extern "C" fn podplay_session_release(id: i64) -> i32 {
    let removed = SESSION_REGISTRY.lock().remove(&id);
    match removed {
        Some(handle) => {
            handle.shutdown();
            log::info!("[ffi] released session {}", id);
            PODPLAY_OK
        }
        None => PODPLAY_ERR_INVALID,
    }
}
