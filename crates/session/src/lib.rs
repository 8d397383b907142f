// Playback session controller for a single audio track

pub mod command;
pub mod controller;
pub mod runtime;
pub mod session;

#[cfg(test)]
mod testing;

pub use command::Command;
pub use controller::{PlaybackSessionController, SessionEventSink};
pub use runtime::SessionHandle;
pub use session::Session;

// Core types callers need alongside the controller
pub use podplay_core::{
    AudioFocusArbiter, EngineEvent, Metadata, PlaybackEngine, PlaybackSnapshot, PlaybackState,
    SessionConfig, SessionError, SessionObserver, SessionResult, SourceHandle,
};
