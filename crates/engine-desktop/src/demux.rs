// Container probing and packet reading with Symphonia

use crate::http::{is_remote, HttpRangeSource};
use podplay_core::{AudioError, Result, SourceHandle};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Format details of the track selected for playback
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// 0 when the container does not say
    pub duration_ms: u64,
}

/// Where the bytes of a source come from
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    File(PathBuf),
    Remote(String),
}

impl Location {
    pub fn resolve(source: &SourceHandle) -> Result<Self> {
        if let Some(path) = source.local_path() {
            return Ok(Location::File(PathBuf::from(path)));
        }
        if is_remote(source.as_str()) {
            return Ok(Location::Remote(source.as_str().to_string()));
        }
        Err(AudioError::LoadError(format!("Unsupported source: {}", source)))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::File(path) => write!(f, "{}", path.display()),
            Location::Remote(url) => f.write_str(url),
        }
    }
}

/// Reads packets of the default track of a container
pub struct Demuxer {
    reader: Box<dyn FormatReader>,
    track_id: u32,
}

impl Demuxer {
    /// Open and probe a local file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| AudioError::LoadError(format!("Cannot open {}: {}", path.display(), e)))?;
        Self::from_media_source(Box::new(file), hint_for(path))
    }

    /// Open and probe a file served over HTTP(S)
    pub fn open_remote(url: &str) -> Result<Self> {
        let source = HttpRangeSource::open(url).map_err(|e| AudioError::LoadError(e.to_string()))?;
        // Query and fragment never carry the extension
        let path = url.split(['?', '#']).next().unwrap_or(url);
        Self::from_media_source(Box::new(source), hint_for(Path::new(path)))
    }

    pub fn open_location(location: &Location) -> Result<Self> {
        match location {
            Location::File(path) => Self::open(path),
            Location::Remote(url) => Self::open_remote(url),
        }
    }

    pub fn from_media_source(source: Box<dyn MediaSource>, hint: Hint) -> Result<Self> {
        let stream = MediaSourceStream::new(source, Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::LoadError(format!("Failed to probe media: {}", e)))?;

        let track_id = probed
            .format
            .default_track()
            .ok_or_else(|| AudioError::LoadError("No playable track".to_string()))?
            .id;

        Ok(Self {
            reader: probed.format,
            track_id,
        })
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn reader(&self) -> &dyn FormatReader {
        &*self.reader
    }

    pub fn track_info(&self) -> Result<TrackInfo> {
        let track = self
            .reader
            .tracks()
            .iter()
            .find(|t| t.id == self.track_id)
            .ok_or_else(|| AudioError::LoadError("Track not found".to_string()))?;
        let params = &track.codec_params;

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| AudioError::UnsupportedFormat("Sample rate not specified".to_string()))?;
        let duration_ms = match (params.time_base, params.n_frames) {
            (Some(tb), Some(frames)) => frames * 1000 * tb.numer as u64 / tb.denom as u64,
            (None, Some(frames)) => frames * 1000 / sample_rate as u64,
            _ => 0,
        };

        Ok(TrackInfo {
            sample_rate,
            channels: params.channels.map(|c| c.count() as u16).unwrap_or(2),
            duration_ms,
        })
    }

    /// Next packet of the selected track, or `None` at end of stream
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            match self.reader.next_packet() {
                Ok(packet) if packet.track_id() == self.track_id => return Ok(Some(packet)),
                Ok(_) => continue,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(None)
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => {
                    return Err(AudioError::DecodingError(format!("Failed to read packet: {}", e)))
                }
            }
        }
    }

    /// Seek to `position_ms` on the selected track
    pub fn seek(&mut self, position_ms: u64) -> Result<()> {
        let Some(tb) = self
            .reader
            .tracks()
            .iter()
            .find(|t| t.id == self.track_id)
            .and_then(|t| t.codec_params.time_base)
        else {
            return Err(AudioError::PlaybackError("Track has no time base".to_string()));
        };

        let ts = position_ms * tb.denom as u64 / (tb.numer as u64 * 1000);
        self.reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| AudioError::PlaybackError(format!("Seek failed: {}", e)))?;
        Ok(())
    }
}

/// Probe hint from the file extension
pub fn hint_for(path: &Path) -> Hint {
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }
    hint
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Write a 16-bit PCM WAV of a rising ramp and return its path
    pub(crate) fn write_wav(sample_rate: u32, channels: u16, frames: u32) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let path = std::env::temp_dir().join(format!(
            "podplay-test-{}-{}.wav",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let mut file = File::create(&path).unwrap();
        file.write_all(&wav_bytes(sample_rate, channels, frames)).unwrap();
        path
    }

    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
        let data_len = frames * channels as u32 * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for frame in 0..frames {
            let sample = (frame % 1000) as i16 * 16;
            for _ in 0..channels {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
        }
        bytes
    }

    #[test]
    fn test_probe_without_extension() {
        let path = write_wav(8_000, 1, 800);
        let bare = path.with_extension("");
        std::fs::rename(&path, &bare).unwrap();

        let demuxer = Demuxer::open(&bare).unwrap();

        assert_eq!(demuxer.track_info().unwrap().sample_rate, 8_000);
        std::fs::remove_file(bare).ok();
    }

    #[test]
    fn test_track_info_from_wav() {
        let path = write_wav(8_000, 2, 16_000);

        let demuxer = Demuxer::open(&path).unwrap();
        let info = demuxer.track_info().unwrap();

        assert_eq!(info.sample_rate, 8_000);
        assert_eq!(info.channels, 2);
        assert_eq!(info.duration_ms, 2_000);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_reads_until_end_of_stream() {
        let path = write_wav(8_000, 1, 4_000);
        let mut demuxer = Demuxer::open(&path).unwrap();

        let mut packets = 0;
        while demuxer.next_packet().unwrap().is_some() {
            packets += 1;
        }

        assert!(packets > 0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_garbage_fails_to_probe() {
        let path = std::env::temp_dir().join(format!("podplay-garbage-{}.mp3", std::process::id()));
        std::fs::write(&path, b"definitely not audio").unwrap();

        let result = Demuxer::open(&path);

        assert!(matches!(result, Err(AudioError::LoadError(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_resolve_location() {
        assert_eq!(
            Location::resolve(&SourceHandle::new("file:///tmp/ep1.mp3")).unwrap(),
            Location::File(PathBuf::from("/tmp/ep1.mp3"))
        );
        assert_eq!(
            Location::resolve(&SourceHandle::new("https://example.com/ep1.mp3")).unwrap(),
            Location::Remote("https://example.com/ep1.mp3".to_string())
        );
        assert!(matches!(
            Location::resolve(&SourceHandle::new("ftp://example.com/ep1.mp3")),
            Err(AudioError::LoadError(_))
        ));
    }

    #[test]
    fn test_track_info_over_http() {
        let url = crate::http::tests::serve(wav_bytes(8_000, 1, 8_000), true);

        let mut demuxer = Demuxer::open_remote(&format!("{}?token=abc", url)).unwrap();

        assert_eq!(demuxer.track_info().unwrap().duration_ms, 1_000);
        assert!(demuxer.next_packet().unwrap().is_some());
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let result = Demuxer::open(Path::new("/nonexistent/podplay/episode.mp3"));
        assert!(matches!(result, Err(AudioError::LoadError(_))));
    }
}
