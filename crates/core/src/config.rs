// Session configuration

use std::time::Duration;

/// Upper bound for engine preparation before it is reported as a failure
pub const DEFAULT_PREPARE_TIMEOUT_MS: u64 = 5_000;

/// Commands that may wait behind the one being handled
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 32;

/// Session tunables
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound applied to every engine prepare
    pub prepare_timeout: Duration,
    /// Capacity of the serialized command queue
    pub command_queue_capacity: usize,
    /// Give focus back when a track plays to its end
    pub release_focus_on_completion: bool,
    /// Speed reported before any change is requested
    pub default_speed: f32,
}

impl SessionConfig {
    pub fn with_prepare_timeout(mut self, timeout: Duration) -> Self {
        self.prepare_timeout = timeout;
        self
    }

    pub fn with_command_queue_capacity(mut self, capacity: usize) -> Self {
        self.command_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_release_focus_on_completion(mut self, release: bool) -> Self {
        self.release_focus_on_completion = release;
        self
    }

    /// Rate applied to every newly loaded source until changed
    pub fn with_default_speed(mut self, speed: f32) -> Self {
        self.default_speed = speed;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prepare_timeout: Duration::from_millis(DEFAULT_PREPARE_TIMEOUT_MS),
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            release_focus_on_completion: true,
            default_speed: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = SessionConfig::default()
            .with_prepare_timeout(Duration::from_millis(250))
            .with_command_queue_capacity(0)
            .with_release_focus_on_completion(false)
            .with_default_speed(1.25);

        assert_eq!(config.prepare_timeout, Duration::from_millis(250));
        assert_eq!(config.command_queue_capacity, 1);
        assert!(!config.release_focus_on_completion);
        assert_eq!(config.default_speed, 1.25);
    }
}
