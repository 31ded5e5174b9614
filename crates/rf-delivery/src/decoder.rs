//! Audio decoding
//!
//! [`SampleSource`] is the seam between the batch engine and whatever turns
//! container files into PCM. [`SymphoniaSource`] covers WAV, MP3, FLAC, OGG
//! and friends through symphonia.

use crate::error::{DeliveryError, DeliveryResult};
use crate::pipeline::AudioBuffer;

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Provider of decoded PCM
pub trait SampleSource: Send + Sync {
    /// Decode a whole file into an interleaved buffer
    fn decode(&self, path: &Path) -> DeliveryResult<AudioBuffer>;

    /// Convert a buffer to another channel count
    ///
    /// Supported: identity, mono to N (duplicate) and N to mono (average).
    /// Any other pair is a [`DeliveryError::ChannelConversion`].
    fn set_channels(
        &self,
        path: &Path,
        buffer: AudioBuffer,
        to: usize,
    ) -> DeliveryResult<AudioBuffer> {
        let from = buffer.channels;

        if from == to {
            Ok(buffer)
        } else if to == 1 && from > 1 {
            Ok(buffer.to_mono())
        } else if from == 1 && to > 1 {
            Ok(buffer.upmix_mono(to))
        } else {
            Err(DeliveryError::ChannelConversion {
                path: path.display().to_string(),
                from,
                to,
            })
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYMPHONIA SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Decoder backed by symphonia
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaSource;

impl SymphoniaSource {
    pub fn new() -> Self {
        Self
    }
}

impl SampleSource for SymphoniaSource {
    fn decode(&self, path: &Path) -> DeliveryResult<AudioBuffer> {
        let file = File::open(path).map_err(|e| {
            DeliveryError::Decode(format!("{}: failed to open: {}", path.display(), e))
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let detected = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| {
                DeliveryError::Decode(format!("{}: unrecognized format: {}", path.display(), e))
            })?;

        let mut format = detected.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DeliveryError::Decode(format!("{}: no audio track", path.display())))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let mut sample_rate = codec_params.sample_rate;
        let mut channels = codec_params.channels.map(|c| c.count());

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| {
                DeliveryError::Decode(format!("{}: unsupported codec: {}", path.display(), e))
            })?;

        let mut samples: Vec<f64> = Vec::new();
        let mut scratch: Option<SampleBuffer<f64>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    return Err(DeliveryError::Decode(format!(
                        "{}: packet read error: {}",
                        path.display(),
                        e
                    )));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt frame; keep going like a player would
                Err(SymphoniaError::DecodeError(e)) => {
                    log::debug!("{}: skipping bad packet: {}", path.display(), e);
                    continue;
                }
                Err(e) => {
                    return Err(DeliveryError::Decode(format!("{}: {}", path.display(), e)));
                }
            };

            let spec = *decoded.spec();
            channels.get_or_insert(spec.channels.count());
            sample_rate.get_or_insert(spec.rate);

            // capacity() counts samples across all channels
            let needed = decoded.capacity() * spec.channels.count();
            if scratch.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                scratch = Some(SampleBuffer::<f64>::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = scratch.as_mut() {
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
        }

        let channels = channels
            .filter(|&c| c > 0)
            .ok_or_else(|| {
                DeliveryError::Decode(format!("{}: unknown channel layout", path.display()))
            })?;
        let sample_rate = sample_rate
            .filter(|&r| r > 0)
            .ok_or_else(|| {
                DeliveryError::Decode(format!("{}: unknown sample rate", path.display()))
            })?;

        Ok(AudioBuffer {
            samples,
            channels,
            sample_rate,
        })
    }
}
