// Error handling for the playback session

use std::fmt;

/// Errors reported by a playback engine
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Failed to open or probe the source
    LoadError(String),

    /// Playback error
    PlaybackError(String),

    /// Engine asked to do something its current state does not allow
    InvalidState(String),

    /// Audio format not supported
    UnsupportedFormat(String),

    /// The engine refused a playback rate change
    RateChangeRejected(String),

    /// Device error (hardware issues)
    DeviceError(String),

    /// Decoding error
    DecodingError(String),

    /// An engine operation did not finish within its bound
    Timeout(String),

    /// IO error
    IoError(String),

    /// Network error (HTTP requests)
    NetworkError(String),

    /// Generic error
    Other(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AudioError::LoadError(msg) => write!(f, "Load error: {}", msg),
            AudioError::PlaybackError(msg) => write!(f, "Playback error: {}", msg),
            AudioError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            AudioError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            AudioError::RateChangeRejected(msg) => write!(f, "Rate change rejected: {}", msg),
            AudioError::DeviceError(msg) => write!(f, "Device error: {}", msg),
            AudioError::DecodingError(msg) => write!(f, "Decoding error: {}", msg),
            AudioError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            AudioError::IoError(msg) => write!(f, "IO error: {}", msg),
            AudioError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AudioError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AudioError>;

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::IoError(err.to_string())
    }
}

/// Errors surfaced by the session controller to its callers.
///
/// Raw engine failures never leave the controller; they are folded into one
/// of these kinds first.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Another owner holds the audio output; nothing changed
    FocusDenied,

    /// The source could not be loaded, prepared or resumed. The session has
    /// fallen back to idle.
    EngineLoadFailed(String),

    /// The engine does not support the requested playback rate
    SpeedChangeFailed(String),

    /// The command queue is full
    Busy,

    /// The session worker is gone
    Closed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionError::FocusDenied => write!(f, "Audio focus denied"),
            SessionError::EngineLoadFailed(msg) => write!(f, "Engine load failed: {}", msg),
            SessionError::SpeedChangeFailed(msg) => write!(f, "Speed change failed: {}", msg),
            SessionError::Busy => write!(f, "Session busy"),
            SessionError::Closed => write!(f, "Session closed"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<AudioError> for SessionError {
    fn from(err: AudioError) -> Self {
        SessionError::EngineLoadFailed(err.to_string())
    }
}

/// Result type alias for session commands
pub type SessionResult<T> = std::result::Result<T, SessionError>;
