//! File decoding using symphonia.
//!
//! Supported formats:
//! - MP3
//! - FLAC
//! - OGG Vorbis
//! - WAV/PCM
//! - AAC (in MP4 container)

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::EngineError;

/// Decodes one audio track to interleaved f32 samples.
pub struct AudioDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    frames: Option<u64>,
    buffer: Option<SampleBuffer<f32>>,
}

impl AudioDecoder {
    /// Open a file and prepare a decoder for its first audio track.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Err(EngineError::FileNotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| EngineError::Decode(format!("{}: {}", path.display(), e)))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| EngineError::UnsupportedFormat(e.to_string()))?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::UnsupportedFormat("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| EngineError::Decode("Unknown sample rate".to_string()))?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| EngineError::Decode(e.to_string()))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            frames: codec_params.n_frames,
            buffer: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Frame count from the container header, if it declares one.
    pub fn frames(&self) -> Option<u64> {
        self.frames
    }

    /// Decode the next packet, appending interleaved samples to `out`.
    ///
    /// Returns `Ok(false)` at end of stream.
    pub fn decode_next(&mut self, out: &mut Vec<f32>) -> Result<bool, EngineError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(EngineError::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                // Corrupt frame, keep going
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(EngineError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let frames = decoded.capacity() as u64;
            let needed = frames * spec.channels.count() as u64;
            let reuse = self.buffer.as_ref().is_some_and(|b| b.capacity() as u64 >= needed);
            if !reuse {
                self.buffer = Some(SampleBuffer::new(frames, spec));
            }

            if let Some(buffer) = self.buffer.as_mut() {
                buffer.copy_interleaved_ref(decoded);
                out.extend_from_slice(buffer.samples());
            }
            return Ok(true);
        }
    }

    /// Decode the whole track into memory.
    pub fn decode_all(mut self) -> Result<Vec<f32>, EngineError> {
        let capacity = self
            .frames
            .map(|f| f as usize * self.channels as usize)
            .unwrap_or(0);
        let mut samples = Vec::with_capacity(capacity);
        while self.decode_next(&mut samples)? {}
        Ok(samples)
    }
}
