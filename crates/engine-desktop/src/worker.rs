// Decode thread and output stream
// The cpal stream is not Send, so it is created and dropped on the decode
// thread. The engine talks to the thread through atomics and the ring.

use crate::config::EngineConfig;
use crate::decode::AudioDecoder;
use crate::demux::{Demuxer, Location, TrackInfo};
use crate::rate::RateConverter;
use crate::ring::SharedRing;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use podplay_core::{AudioError, EngineEvent, EngineEventSink, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the decode loop sleeps when it has nothing to do
const IDLE_WAIT: Duration = Duration::from_millis(5);

pub(crate) type SinkSlot = Arc<Mutex<Option<EngineEventSink>>>;

/// State shared by the engine, the decode thread and the output callback
pub(crate) struct Shared {
    pub ring: SharedRing,
    pub playing: AtomicBool,
    pub stop: AtomicBool,
    pub completed: AtomicBool,
    /// Output frames played since `base_ms`
    pub rendered_frames: AtomicU64,
    pub base_ms: AtomicU64,
    pub output_rate: AtomicU32,
    speed_bits: AtomicU32,
    seek_request: Mutex<Option<u64>>,
}

impl Shared {
    fn new(speed: f32) -> Self {
        Self {
            ring: SharedRing::new(1),
            playing: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            rendered_frames: AtomicU64::new(0),
            base_ms: AtomicU64::new(0),
            output_rate: AtomicU32::new(0),
            speed_bits: AtomicU32::new(speed.to_bits()),
            seek_request: Mutex::new(None),
        }
    }

    pub fn speed(&self) -> f32 {
        f32::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    pub fn set_speed(&self, speed: f32) {
        self.speed_bits.store(speed.to_bits(), Ordering::Relaxed);
    }

    /// Source position derived from the frames the device has consumed
    pub fn position_ms(&self) -> u64 {
        let rate = self.output_rate.load(Ordering::Relaxed) as f64;
        let base = self.base_ms.load(Ordering::Relaxed);
        if rate <= 0.0 {
            return base;
        }
        let frames = self.rendered_frames.load(Ordering::Relaxed) as f64;
        base + (frames * 1000.0 * self.speed() as f64 / rate) as u64
    }

    /// Ask the decode thread to restart from `position_ms`
    pub fn request_seek(&self, position_ms: u64) {
        *self.seek_request.lock() = Some(position_ms);
        self.ring.clear();
        self.base_ms.store(position_ms, Ordering::Relaxed);
        self.rendered_frames.store(0, Ordering::Relaxed);
        self.completed.store(false, Ordering::Relaxed);
    }

    fn take_seek(&self) -> Option<u64> {
        self.seek_request.lock().take()
    }
}

/// Where and how the decode thread starts
pub(crate) struct WorkerParams {
    pub location: Location,
    pub info: TrackInfo,
    pub start_ms: u64,
    pub speed: f32,
    pub config: EngineConfig,
    pub sink: SinkSlot,
}

/// A running decode thread
pub(crate) struct Worker {
    pub shared: Arc<Shared>,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start the decode thread and wait until it has buffered enough audio.
    /// Gives up after `timeout`, leaving the thread to exit on its own.
    pub fn start(params: WorkerParams, timeout: Duration) -> Result<Self> {
        let shared = Arc::new(Shared::new(params.speed));
        let (ready_tx, ready_rx) = bounded(1);

        let thread_shared = shared.clone();
        let join = thread::Builder::new()
            .name("podplay-decode".into())
            .spawn(move || run(params, thread_shared, ready_tx))
            .map_err(|e| AudioError::PlaybackError(format!("Failed to spawn decode thread: {}", e)))?;

        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(())) => Ok(Self {
                shared,
                join: Some(join),
            }),
            Ok(Err(err)) => {
                let _ = join.join();
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("[engine] prepare timed out after {} ms", timeout.as_millis());
                shared.stop.store(true, Ordering::Release);
                Err(AudioError::Timeout(format!(
                    "source not ready after {} ms",
                    timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = join.join();
                Err(AudioError::PlaybackError("Decode thread exited during prepare".to_string()))
            }
        }
    }

    /// Wrap an arbitrary thread, with no device behind it
    #[cfg(test)]
    pub(crate) fn from_thread(join: JoinHandle<()>) -> Self {
        Self {
            shared: Arc::new(Shared::new(1.0)),
            join: Some(join),
        }
    }

    /// False once the decode thread has exited, after an error or a stop
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    pub fn shutdown(&mut self) {
        self.shared.playing.store(false, Ordering::Relaxed);
        self.shared.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("[engine] decode thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(params: WorkerParams, shared: Arc<Shared>, ready: Sender<Result<()>>) {
    let (stream, mut decode) = match setup(&params, shared) {
        Ok(parts) => parts,
        Err(err) => {
            log::error!("[engine] prepare failed: {}", err);
            let _ = ready.send(Err(err));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        log::debug!("[engine] prepare abandoned, decode thread exiting");
        return;
    }

    decode.run();
    drop(stream);
    log::debug!("[engine] decode thread stopped");
}

fn setup(params: &WorkerParams, shared: Arc<Shared>) -> Result<(Stream, DecodeLoop)> {
    let mut demuxer = Demuxer::open_location(&params.location)?;
    let decoder = AudioDecoder::from_demuxer(&demuxer)?;
    let (stream, output_rate, output_channels) = open_output(shared.clone())?;

    shared
        .ring
        .resize(params.config.ring_capacity(output_rate, output_channels));
    shared.output_rate.store(output_rate, Ordering::Relaxed);
    log::info!(
        "[engine] {} Hz x{} -> {} Hz x{} at {}x",
        params.info.sample_rate,
        params.info.channels,
        output_rate,
        output_channels,
        params.speed
    );

    if params.start_ms > 0 {
        demuxer.seek(params.start_ms)?;
        shared.base_ms.store(params.start_ms, Ordering::Relaxed);
    }

    let mut decode = DecodeLoop {
        converter: RateConverter::new(
            params.info.sample_rate,
            params.info.channels,
            output_rate,
            output_channels,
            params.speed,
        ),
        demuxer,
        decoder,
        shared,
        sink: params.sink.clone(),
        info: params.info.clone(),
        output_rate,
        output_channels,
        pending: Vec::new(),
        pending_at: 0,
        ended: false,
    };
    decode.prefill(params.config.prefill_samples(output_rate, output_channels))?;
    Ok((stream, decode))
}

/// Build and start the device stream. It outputs silence until `playing` is set.
fn open_output(shared: Arc<Shared>) -> Result<(Stream, u32, u16)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceError("No output device available".to_string()))?;
    let config: StreamConfig = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceError(format!("No usable output config: {}", e)))?
        .config();

    let channels = config.channels;
    let sample_rate = config.sample_rate.0;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !shared.playing.load(Ordering::Relaxed) {
                    data.fill(0.0);
                    return;
                }

                let read = shared.ring.read(data);
                if read < data.len() {
                    data[read..].fill(0.0);
                }
                shared
                    .rendered_frames
                    .fetch_add((read / channels as usize) as u64, Ordering::Relaxed);
            },
            |err| log::error!("[engine] output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::DeviceError(format!("Failed to build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| AudioError::DeviceError(format!("Failed to start output stream: {}", e)))?;

    Ok((stream, sample_rate, channels))
}

enum Pump {
    Progress,
    Full,
    Ended,
}

struct DecodeLoop {
    demuxer: Demuxer,
    decoder: AudioDecoder,
    converter: RateConverter,
    shared: Arc<Shared>,
    sink: SinkSlot,
    info: TrackInfo,
    output_rate: u32,
    output_channels: u16,
    /// Converted samples that did not fit in the ring yet
    pending: Vec<f32>,
    pending_at: usize,
    ended: bool,
}

impl DecodeLoop {
    fn prefill(&mut self, target: usize) -> Result<()> {
        while self.shared.ring.len() < target {
            match self.pump()? {
                Pump::Progress => {}
                Pump::Full | Pump::Ended => break,
            }
        }
        Ok(())
    }

    fn run(&mut self) {
        while !self.shared.stop.load(Ordering::Acquire) {
            if let Some(position_ms) = self.shared.take_seek() {
                self.seek(position_ms);
                continue;
            }

            match self.pump() {
                Ok(Pump::Progress) => {}
                Ok(Pump::Full) => thread::sleep(IDLE_WAIT),
                Ok(Pump::Ended) => {
                    self.finish_if_drained();
                    thread::sleep(IDLE_WAIT);
                }
                Err(err) => {
                    log::error!("[engine] playback failed: {}", err);
                    self.shared.playing.store(false, Ordering::Relaxed);
                    self.emit(EngineEvent::Error {
                        message: err.to_string(),
                    });
                    break;
                }
            }
        }
    }

    fn pump(&mut self) -> Result<Pump> {
        if self.pending_at < self.pending.len() {
            self.pending_at += self.shared.ring.write(&self.pending[self.pending_at..]);
            if self.pending_at < self.pending.len() {
                return Ok(Pump::Full);
            }
            return Ok(Pump::Progress);
        }
        if self.ended {
            return Ok(Pump::Ended);
        }

        let Some(packet) = self.demuxer.next_packet()? else {
            log::debug!("[engine] end of stream");
            self.ended = true;
            return Ok(Pump::Ended);
        };
        if let Some(samples) = self.decoder.decode(&packet)? {
            self.pending.clear();
            self.pending_at = 0;
            self.converter.process(samples, &mut self.pending);
        }
        Ok(Pump::Progress)
    }

    fn seek(&mut self, position_ms: u64) {
        log::debug!("[engine] seeking to {} ms", position_ms);
        if let Err(err) = self.demuxer.seek(position_ms) {
            log::warn!("[engine] {}", err);
        }
        self.decoder.reset();
        self.converter = RateConverter::new(
            self.info.sample_rate,
            self.decoder.channels(),
            self.output_rate,
            self.output_channels,
            self.shared.speed(),
        );
        self.pending.clear();
        self.pending_at = 0;
        self.ended = false;

        // Drop whatever was written between the request and now
        self.shared.ring.clear();
        self.shared.base_ms.store(position_ms, Ordering::Relaxed);
        self.shared.rendered_frames.store(0, Ordering::Relaxed);
    }

    fn finish_if_drained(&mut self) {
        if !self.shared.playing.load(Ordering::Relaxed) || !self.shared.ring.is_empty() {
            return;
        }
        log::info!("[engine] playback completed");
        self.shared.playing.store(false, Ordering::Relaxed);
        self.shared.completed.store(true, Ordering::Relaxed);
        self.emit(EngineEvent::Completed);
    }

    fn emit(&self, event: EngineEvent) {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => sink(event),
            None => log::debug!("[engine] no sink for {:?}", event),
        }
    }
}
