// Core types and traits for the PodPlay playback session

pub mod config;
pub mod engine;
pub mod error;
pub mod focus;
pub mod media;
pub mod observer;
pub mod state;

// Re-export commonly used types
pub use config::SessionConfig;
pub use engine::{EngineEvent, EngineEventSink, PlaybackEngine};
pub use error::{AudioError, Result, SessionError, SessionResult};
pub use focus::{AudioFocusArbiter, FocusDenied, FocusToken};
pub use media::{Metadata, SourceHandle};
pub use observer::{ObserverSet, SessionObserver};
pub use state::{Actions, PlaybackSnapshot, PlaybackState, SnapshotCell};
