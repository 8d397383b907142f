// Audio focus arbitration contract

use std::fmt;

/// Proof that the holder currently owns the audio output.
///
/// Not `Clone`: a controller holds at most one, and handing it back to the
/// arbiter consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct FocusToken {
    id: u64,
}

impl FocusToken {
    /// Only arbiters mint tokens
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Focus could not be granted; a normal outcome, not a fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusDenied {
    /// Name of the current holder, when known
    pub holder: Option<String>,
}

impl fmt::Display for FocusDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.holder {
            Some(holder) => write!(f, "audio focus held by {}", holder),
            None => write!(f, "audio focus unavailable"),
        }
    }
}

impl std::error::Error for FocusDenied {}

/// Grants and revokes exclusive use of the audio output
pub trait AudioFocusArbiter: Send + Sync {
    fn acquire(&self) -> std::result::Result<FocusToken, FocusDenied>;

    /// Give focus back. Releasing a stale token is a no-op.
    fn release(&self, token: FocusToken);
}
