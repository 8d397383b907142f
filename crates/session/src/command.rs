// Commands accepted by the session

use podplay_core::{Metadata, SourceHandle};

/// A caller request, applied to the session one at a time
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Play `source`, loading it unless it is already the current source
    PlayFromSource {
        source: SourceHandle,
        metadata: Metadata,
    },
    /// Resume the current source
    Resume,
    Pause,
    Stop,
    /// Seek to a position in milliseconds; out-of-range values are clamped
    SeekTo(i64),
    /// Change the playback rate
    ChangeSpeed(f32),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::PlayFromSource { .. } => "play_from_source",
            Command::Resume => "resume",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::SeekTo(_) => "seek_to",
            Command::ChangeSpeed(_) => "change_speed",
        }
    }
}
