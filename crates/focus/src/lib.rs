// Process-wide audio focus arbitration
// One registry owns the output; each playback session talks to it through its
// own client.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use podplay_core::{AudioFocusArbiter, FocusDenied, FocusToken};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static GLOBAL_REGISTRY: Lazy<FocusRegistry> = Lazy::new(FocusRegistry::new);

struct Grant {
    token_id: u64,
    owner_id: u64,
    owner_name: String,
}

#[derive(Default)]
struct RegistryState {
    grant: Option<Grant>,
    blocked: bool,
}

/// Owner of the audio output focus
#[derive(Clone)]
pub struct FocusRegistry {
    state: Arc<Mutex<RegistryState>>,
    next_token: Arc<AtomicU64>,
    next_owner: Arc<AtomicU64>,
}

impl FocusRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            next_token: Arc::new(AtomicU64::new(1)),
            next_owner: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The registry shared by every session in this process
    pub fn global() -> &'static FocusRegistry {
        &GLOBAL_REGISTRY
    }

    /// Create an arbiter for one session
    pub fn client(&self, name: impl Into<String>) -> FocusClient {
        FocusClient {
            registry: self.clone(),
            owner_id: self.next_owner.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }

    /// While blocked every request is denied, e.g. during a phone call.
    /// The current grant is left in place.
    pub fn set_blocked(&self, blocked: bool) {
        log::info!("[focus] output {}", if blocked { "blocked" } else { "unblocked" });
        self.state.lock().blocked = blocked;
    }

    /// Name of the session currently holding focus
    pub fn holder(&self) -> Option<String> {
        self.state.lock().grant.as_ref().map(|g| g.owner_name.clone())
    }

    fn acquire(&self, owner_id: u64, owner_name: &str) -> Result<FocusToken, FocusDenied> {
        let mut state = self.state.lock();

        if state.blocked {
            log::info!("[focus] {} denied: output blocked", owner_name);
            return Err(FocusDenied { holder: None });
        }

        if let Some(grant) = &state.grant {
            if grant.owner_id != owner_id {
                log::info!("[focus] {} denied: held by {}", owner_name, grant.owner_name);
                return Err(FocusDenied {
                    holder: Some(grant.owner_name.clone()),
                });
            }
        }

        let token_id = self.next_token.fetch_add(1, Ordering::Relaxed);
        state.grant = Some(Grant {
            token_id,
            owner_id,
            owner_name: owner_name.to_string(),
        });
        log::debug!("[focus] granted token {} to {}", token_id, owner_name);
        Ok(FocusToken::new(token_id))
    }

    fn release(&self, token: FocusToken) {
        let mut state = self.state.lock();
        match &state.grant {
            Some(grant) if grant.token_id == token.id() => {
                log::debug!("[focus] {} released token {}", grant.owner_name, token.id());
                state.grant = None;
            }
            _ => log::debug!("[focus] ignoring stale token {}", token.id()),
        }
    }
}

impl Default for FocusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-session view of a [`FocusRegistry`]
pub struct FocusClient {
    registry: FocusRegistry,
    owner_id: u64,
    name: String,
}

impl FocusClient {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AudioFocusArbiter for FocusClient {
    fn acquire(&self) -> Result<FocusToken, FocusDenied> {
        self.registry.acquire(self.owner_id, &self.name)
    }

    fn release(&self, token: FocusToken) {
        self.registry.release(token)
    }
}
