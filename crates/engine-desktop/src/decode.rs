// Packet decoding into interleaved f32 samples

use crate::demux::Demuxer;
use podplay_core::{AudioError, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

/// Decoder for the demuxer's selected track
pub struct AudioDecoder {
    decoder: Box<dyn Decoder>,
    samples: Option<SampleBuffer<f32>>,
    channels: u16,
}

impl AudioDecoder {
    pub fn from_demuxer(demuxer: &Demuxer) -> Result<Self> {
        let info = demuxer.track_info()?;
        let track = demuxer
            .reader()
            .tracks()
            .iter()
            .find(|t| t.id == demuxer.track_id())
            .ok_or_else(|| AudioError::LoadError("Track not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::UnsupportedFormat(format!("No decoder for track: {}", e)))?;

        Ok(Self {
            decoder,
            samples: None,
            channels: info.channels,
        })
    }

    /// Decode one packet.
    ///
    /// Returns `None` for a corrupt packet that was skipped; decoding can
    /// continue with the next one.
    pub fn decode(&mut self, packet: &Packet) -> Result<Option<&[f32]>> {
        let decoded = match self.decoder.decode(packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("[engine] skipping corrupt packet: {}", msg);
                return Ok(None);
            }
            Err(e) => return Err(AudioError::DecodingError(format!("Decoding failed: {}", e))),
        };

        let spec = *decoded.spec();
        let frames = decoded.capacity() as u64;
        self.channels = spec.channels.count() as u16;

        let needed = frames as usize * spec.channels.count();
        if self.samples.as_ref().map_or(true, |b| b.capacity() < needed) {
            self.samples = None;
        }
        let buffer = self
            .samples
            .get_or_insert_with(|| SampleBuffer::new(frames, spec));
        buffer.copy_interleaved_ref(decoded);
        Ok(Some(buffer.samples()))
    }

    /// Drop decoder state after a seek
    pub fn reset(&mut self) {
        self.decoder.reset();
    }

    /// Channel count of the most recent packet
    pub fn channels(&self) -> u16 {
        self.channels
    }
}
