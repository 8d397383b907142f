// Engine tunables

/// Desktop engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seconds of converted audio buffered ahead of the output
    pub ring_buffer_secs: u32,
    /// Audio decoded before prepare reports ready
    pub prefill_ms: u64,
    pub min_speed: f32,
    pub max_speed: f32,
}

impl EngineConfig {
    pub fn supports_speed(&self, rate: f32) -> bool {
        rate.is_finite() && rate >= self.min_speed && rate <= self.max_speed
    }

    /// Ring capacity in samples for the given output format
    pub fn ring_capacity(&self, sample_rate: u32, channels: u16) -> usize {
        (self.ring_buffer_secs.max(1) as usize) * sample_rate as usize * channels as usize
    }

    /// Samples to buffer before playback may start
    pub fn prefill_samples(&self, sample_rate: u32, channels: u16) -> usize {
        (self.prefill_ms * sample_rate as u64 / 1000) as usize * channels as usize
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_buffer_secs: 5,
            prefill_ms: 100,
            min_speed: 0.5,
            max_speed: 3.0,
        }
    }
}
