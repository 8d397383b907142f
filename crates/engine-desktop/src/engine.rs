// PlaybackEngine for desktop platforms (Windows, macOS, Linux)

use crate::config::EngineConfig;
use crate::demux::{Demuxer, Location, TrackInfo};
use crate::worker::{SinkSlot, Worker, WorkerParams};
use parking_lot::Mutex;
use podplay_core::{AudioError, EngineEventSink, PlaybackEngine, Result, SourceHandle};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

struct LoadedSource {
    location: Location,
    info: TrackInfo,
}

/// Plays local files and HTTP(S) streams through the default output device.
///
/// A rate change while prepared re-decodes from the current position.
/// `set_speed` is rejected when the rate is out of bounds or the decode
/// thread has died, and the source then has to be prepared again.
pub struct DesktopEngine {
    config: EngineConfig,
    loaded: Option<LoadedSource>,
    worker: Option<Worker>,
    /// Where the next prepare starts decoding
    start_ms: u64,
    speed: f32,
    sink: SinkSlot,
}

impl DesktopEngine {
    /// Create an engine. No device is opened until `prepare`.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loaded: None,
            worker: None,
            start_ms: 0,
            speed: 1.0,
            sink: Arc::new(Mutex::new(None)),
        }
    }

    fn stop_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
    }

    fn require_loaded(&self) -> Result<&LoadedSource> {
        self.loaded
            .as_ref()
            .ok_or_else(|| AudioError::InvalidState("No source loaded".to_string()))
    }

    fn clamp(&self, position_ms: u64) -> u64 {
        match self.duration() {
            0 => position_ms,
            duration => position_ms.min(duration),
        }
    }
}

impl Default for DesktopEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl PlaybackEngine for DesktopEngine {
    fn load(&mut self, source: &SourceHandle) -> Result<()> {
        self.stop_worker();
        self.loaded = None;
        self.start_ms = 0;

        let location = Location::resolve(source)?;
        let info = Demuxer::open_location(&location)?.track_info()?;
        log::info!(
            "[engine] loaded {} ({} ms, {} Hz, {} ch)",
            location,
            info.duration_ms,
            info.sample_rate,
            info.channels
        );
        self.loaded = Some(LoadedSource { location, info });
        Ok(())
    }

    fn prepare(&mut self, timeout: Duration) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let loaded = self.require_loaded()?;

        let params = WorkerParams {
            location: loaded.location.clone(),
            info: loaded.info.clone(),
            start_ms: self.start_ms,
            speed: self.speed,
            config: self.config.clone(),
            sink: self.sink.clone(),
        };
        self.worker = Some(Worker::start(params, timeout)?);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| AudioError::InvalidState("Engine is not prepared".to_string()))?;

        // Starting again after the end replays from the top
        if worker.shared.completed.load(Ordering::Relaxed) {
            worker.shared.request_seek(0);
        }
        worker.shared.playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if let Some(worker) = &self.worker {
            worker.shared.playing.store(false, Ordering::Relaxed);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stop_worker();
        self.start_ms = 0;
        Ok(())
    }

    fn reset(&mut self) {
        self.stop_worker();
        self.loaded = None;
        self.start_ms = 0;
        self.speed = 1.0;
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.require_loaded()?;
        let target = self.clamp(position_ms);

        match &self.worker {
            Some(worker) => worker.shared.request_seek(target),
            None => self.start_ms = target,
        }
        Ok(())
    }

    fn set_speed(&mut self, rate: f32) -> Result<()> {
        if !self.config.supports_speed(rate) {
            return Err(AudioError::RateChangeRejected(format!(
                "{}x is outside {}x..{}x",
                rate, self.config.min_speed, self.config.max_speed
            )));
        }

        if let Some(worker) = &self.worker {
            if !worker.is_running() {
                return Err(AudioError::RateChangeRejected(
                    "decode thread is not running".to_string(),
                ));
            }
            // Re-decode what was buffered at the old rate
            let position_ms = worker.shared.position_ms();
            worker.shared.set_speed(rate);
            worker.shared.request_seek(position_ms);
        }
        self.speed = rate;
        Ok(())
    }

    fn supports_speed(&self, rate: f32) -> bool {
        self.config.supports_speed(rate)
    }

    fn current_position(&self) -> u64 {
        match &self.worker {
            Some(worker) if worker.shared.completed.load(Ordering::Relaxed) => self.duration(),
            Some(worker) => self.clamp(worker.shared.position_ms()),
            None => self.start_ms,
        }
    }

    fn duration(&self) -> u64 {
        self.loaded.as_ref().map_or(0, |l| l.info.duration_ms)
    }

    fn is_playing(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.shared.playing.load(Ordering::Relaxed))
    }

    fn set_event_sink(&mut self, sink: EngineEventSink) {
        *self.sink.lock() = Some(sink);
    }
}

impl Drop for DesktopEngine {
    fn drop(&mut self) {
        self.reset();
    }
}
