// Observer hooks for session state changes
// Presentation layers (UI, notifications) consume these; the three hooks are
// kept separate so the host can choose how much to tear down.

use crate::media::Metadata;
use crate::state::PlaybackSnapshot;
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives session notifications.
/// Implementations should be lightweight and non-blocking; they run on the
/// session's command thread.
pub trait SessionObserver: Send + Sync {
    /// A transition landed in `Playing` or `Paused`
    fn on_state_changed(&self, snapshot: &PlaybackSnapshot);

    /// Playback was paused (explicitly or at end of track).
    /// The host may downgrade its presentation but should keep it.
    fn on_paused(&self, snapshot: &PlaybackSnapshot);

    /// Playback stopped or failed; session-level resources may be released
    fn on_stopped(&self);

    /// Metadata for the current source was attached or refreshed
    fn on_metadata_changed(&self, _metadata: &Metadata) {}
}

/// Ordered set of observers notified together
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Arc<Mutex<Vec<Arc<dyn SessionObserver>>>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<dyn SessionObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn clear(&self) {
        self.observers.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state_changed(&self, snapshot: &PlaybackSnapshot) {
        for observer in self.current() {
            observer.on_state_changed(snapshot);
        }
    }

    pub fn paused(&self, snapshot: &PlaybackSnapshot) {
        for observer in self.current() {
            observer.on_paused(snapshot);
        }
    }

    pub fn stopped(&self) {
        for observer in self.current() {
            observer.on_stopped();
        }
    }

    pub fn metadata_changed(&self, metadata: &Metadata) {
        for observer in self.current() {
            observer.on_metadata_changed(metadata);
        }
    }

    // Observers may register further observers from a hook; never call them
    // with the lock held.
    fn current(&self) -> Vec<Arc<dyn SessionObserver>> {
        self.observers.lock().clone()
    }
}
