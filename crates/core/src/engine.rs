// Playback engine abstraction driven by the session controller

use crate::error::Result;
use crate::media::SourceHandle;
use std::sync::Arc;
use std::time::Duration;

/// Events raised by an engine outside of any command
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Playback reached the end of the track
    Completed,

    /// Playback failed after it had started
    Error { message: String },
}

/// Where an engine delivers its events.
/// Implementations must not block; the session runtime forwards events into
/// its command queue.
pub type EngineEventSink = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Audio engine capability
///
/// The controller serializes every call; implementations do not need to be
/// re-entrant.
pub trait PlaybackEngine: Send {
    /// Open a source, replacing whatever was loaded
    fn load(&mut self, source: &SourceHandle) -> Result<()>;

    /// Make the loaded source ready to play. Must give up and return
    /// `AudioError::Timeout` after `timeout`.
    fn prepare(&mut self, timeout: Duration) -> Result<()>;

    /// Start or resume playback
    fn play(&mut self) -> Result<()>;

    /// Pause playback, keeping position
    fn pause(&mut self) -> Result<()>;

    /// Stop playback. The source stays loaded but must be prepared again.
    fn stop(&mut self) -> Result<()>;

    /// Drop the loaded source and return to a fresh state
    fn reset(&mut self);

    /// Seek to a position in milliseconds
    fn seek_to(&mut self, position_ms: u64) -> Result<()>;

    /// Change the playback rate (1.0 = normal speed)
    fn set_speed(&mut self, rate: f32) -> Result<()>;

    /// Whether the engine can ever play at `rate`
    fn supports_speed(&self, rate: f32) -> bool;

    /// Current playback position in milliseconds
    fn current_position(&self) -> u64;

    /// Duration of the loaded source in milliseconds, 0 when unknown
    fn duration(&self) -> u64;

    fn is_playing(&self) -> bool;

    /// Install the sink for completion and error events
    fn set_event_sink(&mut self, sink: EngineEventSink);
}
