// Playback state, snapshots and the shared snapshot cell

use parking_lot::RwLock;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Session playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No source loaded, or the session fell back after a failure
    Idle,
    /// Source is being loaded and prepared by the engine
    Preparing,
    /// Audio is currently playing
    Playing,
    /// Audio is paused
    Paused,
    /// Playback has stopped; the source is still known
    Stopped,
}

impl PlaybackState {
    /// Whether a transition into this state is surfaced to observers
    pub fn is_published(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }

    /// Commands that make sense from this state
    pub fn available_actions(self) -> Actions {
        match self {
            PlaybackState::Idle => Actions::PLAY_FROM_URI,
            PlaybackState::Preparing => Actions::STOP,
            PlaybackState::Playing => {
                Actions::PAUSE
                    | Actions::PLAY_PAUSE
                    | Actions::STOP
                    | Actions::SEEK_TO
                    | Actions::SET_SPEED
                    | Actions::PLAY_FROM_URI
            }
            PlaybackState::Paused => {
                Actions::PLAY
                    | Actions::PLAY_PAUSE
                    | Actions::STOP
                    | Actions::SEEK_TO
                    | Actions::SET_SPEED
                    | Actions::PLAY_FROM_URI
            }
            PlaybackState::Stopped => {
                Actions::PLAY
                    | Actions::PLAY_PAUSE
                    | Actions::SEEK_TO
                    | Actions::SET_SPEED
                    | Actions::PLAY_FROM_URI
            }
        }
    }

    /// Check that the state machine allows moving from `self` to `to`
    pub fn can_transition_to(self, to: PlaybackState) -> bool {
        use PlaybackState::*;

        match (self, to) {
            // Any state can start a new source or fall back after a failure
            (_, Preparing) | (_, Idle) => true,

            (Preparing, Playing) => true,
            (Preparing, Paused) => true,
            (Preparing, Stopped) => true,

            (Playing, Paused) | (Playing, Stopped) => true,
            (Paused, Playing) | (Paused, Stopped) => true,
            (Stopped, Playing) => true,

            // Seek and speed changes recompute without moving
            (from, to) if from == to => true,

            _ => false,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Preparing => write!(f, "preparing"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Bitmask of commands currently valid for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Actions(u32);

impl Actions {
    pub const NONE: Actions = Actions(0);
    pub const PLAY: Actions = Actions(1 << 0);
    pub const PAUSE: Actions = Actions(1 << 1);
    pub const PLAY_PAUSE: Actions = Actions(1 << 2);
    pub const STOP: Actions = Actions(1 << 3);
    pub const SEEK_TO: Actions = Actions(1 << 4);
    pub const SET_SPEED: Actions = Actions(1 << 5);
    pub const PLAY_FROM_URI: Actions = Actions(1 << 6);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Actions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Actions {
    type Output = Actions;

    fn bitor(self, rhs: Actions) -> Actions {
        Actions(self.0 | rhs.0)
    }
}

impl BitOrAssign for Actions {
    fn bitor_assign(&mut self, rhs: Actions) {
        self.0 |= rhs.0;
    }
}

/// Immutable view of the session handed to observers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    /// Elapsed time in milliseconds; 0 while idle
    pub position_ms: u64,
    /// Total duration in milliseconds; 0 when unknown
    pub duration_ms: u64,
    /// Current playback rate
    pub speed: f32,
    pub actions: Actions,
}

impl PlaybackSnapshot {
    pub fn idle(speed: f32) -> Self {
        Self {
            state: PlaybackState::Idle,
            position_ms: 0,
            duration_ms: 0,
            speed,
            actions: PlaybackState::Idle.available_actions(),
        }
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self::idle(1.0)
    }
}

/// Thread-safe holder for the latest snapshot.
///
/// The controller writes it on every transition; handles read it without
/// going through the command queue.
#[derive(Clone, Default)]
pub struct SnapshotCell {
    inner: Arc<RwLock<PlaybackSnapshot>>,
}

impl SnapshotCell {
    pub fn new(initial: PlaybackSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> PlaybackSnapshot {
        *self.inner.read()
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.read().state
    }

    pub fn set(&self, snapshot: PlaybackSnapshot) {
        let mut current = self.inner.write();
        if current.state != snapshot.state {
            log::debug!("[session] state {} -> {}", current.state, snapshot.state);
        }
        *current = snapshot;
    }
}
