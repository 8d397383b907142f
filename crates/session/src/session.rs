// The controller's record of what is loaded and who holds focus

use podplay_core::{FocusToken, Metadata, SourceHandle};

/// Live playback context, owned by exactly one controller
#[derive(Debug, Default)]
pub struct Session {
    pub(crate) current_source: Option<SourceHandle>,
    /// The engine has not loaded `current_source` yet
    pub(crate) is_new_source: bool,
    /// Metadata waiting for the new source to finish preparing
    pub(crate) pending_metadata: Option<Metadata>,
    pub(crate) focus: Option<FocusToken>,
    /// Metadata currently presented for the source
    pub(crate) metadata: Option<Metadata>,
    pub(crate) active: bool,
    /// The engine was stopped and must be prepared before it plays again
    pub(crate) needs_prepare: bool,
}

impl Session {
    pub(crate) fn set_new_source(&mut self, source: SourceHandle, metadata: Metadata) {
        self.is_new_source = true;
        self.current_source = Some(source);
        self.pending_metadata = Some(metadata);
    }

    /// Forget the source after a failure; focus is handled by the controller
    pub(crate) fn clear_source(&mut self) {
        self.current_source = None;
        self.is_new_source = false;
        self.pending_metadata = None;
        self.metadata = None;
        self.active = false;
        self.needs_prepare = false;
    }

    pub fn current_source(&self) -> Option<&SourceHandle> {
        self.current_source.as_ref()
    }

    pub fn has_source(&self) -> bool {
        self.current_source.is_some()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn holds_focus(&self) -> bool {
        self.focus.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
