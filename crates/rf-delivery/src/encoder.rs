//! Audio encoding
//!
//! [`SampleSink`] writes one PCM segment to disk. [`LameMp3Sink`] produces
//! constant-bitrate MP3 through the native LAME bindings, no FFmpeg needed.

use crate::config::CbrBitrate;
use crate::error::{DeliveryError, DeliveryResult};
use crate::pipeline::{sample_to_pcm16, AudioSlice};

use std::path::Path;

// ═══════════════════════════════════════════════════════════════════════════════
// SINK TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Encoder that writes finished segments
pub trait SampleSink: Send + Sync {
    /// Encode `audio` into `output_path`, creating parent directories
    fn encode(
        &self,
        audio: AudioSlice<'_>,
        output_path: &Path,
        bitrate: CbrBitrate,
    ) -> DeliveryResult<()>;

    /// File extension of the produced files (no dot)
    fn extension(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// MP3 SINK (native LAME)
// ═══════════════════════════════════════════════════════════════════════════════

/// Constant-bitrate MP3 writer using LAME via mp3lame-encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct LameMp3Sink;

impl LameMp3Sink {
    pub fn new() -> Self {
        Self
    }

    fn lame_bitrate(bitrate: CbrBitrate) -> DeliveryResult<mp3lame_encoder::Bitrate> {
        use mp3lame_encoder::Bitrate;

        Ok(match bitrate.kbps() {
            96 => Bitrate::Kbps96,
            112 => Bitrate::Kbps112,
            128 => Bitrate::Kbps128,
            160 => Bitrate::Kbps160,
            192 => Bitrate::Kbps192,
            224 => Bitrate::Kbps224,
            256 => Bitrate::Kbps256,
            320 => Bitrate::Kbps320,
            other => {
                return Err(DeliveryError::Encode(format!("no LAME CBR rate for {}k", other)));
            }
        })
    }

    /// Encode to an in-memory MP3 stream
    pub fn encode_to_vec(
        &self,
        audio: AudioSlice<'_>,
        bitrate: CbrBitrate,
    ) -> DeliveryResult<Vec<u8>> {
        use mp3lame_encoder::{Builder, DualPcm, FlushNoGap};

        if audio.channels == 0 || audio.channels > 2 {
            return Err(DeliveryError::Encode(format!(
                "MP3 supports 1 or 2 channels, got {}",
                audio.channels
            )));
        }

        let mut builder = Builder::new()
            .ok_or_else(|| DeliveryError::Encode("LAME encoder init failed".to_string()))?;

        builder
            .set_num_channels(audio.channels as u8)
            .map_err(|e| DeliveryError::Encode(format!("LAME set channels failed: {:?}", e)))?;

        builder
            .set_sample_rate(audio.sample_rate)
            .map_err(|e| DeliveryError::Encode(format!("LAME set sample rate failed: {:?}", e)))?;

        builder
            .set_brate(Self::lame_bitrate(bitrate)?)
            .map_err(|e| DeliveryError::Encode(format!("LAME set bitrate failed: {:?}", e)))?;

        builder
            .set_quality(mp3lame_encoder::Quality::Best)
            .map_err(|e| DeliveryError::Encode(format!("LAME set quality failed: {:?}", e)))?;

        let mut encoder = builder
            .build()
            .map_err(|e| DeliveryError::Encode(format!("LAME build failed: {:?}", e)))?;

        // LAME takes 16-bit planar input; for mono the right plane is ignored
        let num_frames = audio.frames();
        let mut left: Vec<i16> = Vec::with_capacity(num_frames);
        let mut right: Vec<i16> = Vec::with_capacity(num_frames);

        for frame in audio.samples.chunks_exact(audio.channels) {
            let l = sample_to_pcm16(frame[0]);
            left.push(l);
            right.push(if audio.channels == 2 {
                sample_to_pcm16(frame[1])
            } else {
                l
            });
        }

        let mut mp3_output: Vec<u8> =
            Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(num_frames));

        let encoded_size = encoder
            .encode(
                DualPcm {
                    left: &left,
                    right: &right,
                },
                mp3_output.spare_capacity_mut(),
            )
            .map_err(|e| DeliveryError::Encode(format!("LAME encode failed: {:?}", e)))?;

        // SAFETY: encoder wrote encoded_size bytes into spare capacity
        unsafe {
            mp3_output.set_len(encoded_size);
        }

        mp3_output.reserve(7200);
        let flush_size = encoder
            .flush::<FlushNoGap>(mp3_output.spare_capacity_mut())
            .map_err(|e| DeliveryError::Encode(format!("LAME flush failed: {:?}", e)))?;

        // SAFETY: encoder wrote flush_size bytes into spare capacity
        unsafe {
            mp3_output.set_len(mp3_output.len() + flush_size);
        }

        Ok(mp3_output)
    }
}

impl SampleSink for LameMp3Sink {
    fn encode(
        &self,
        audio: AudioSlice<'_>,
        output_path: &Path,
        bitrate: CbrBitrate,
    ) -> DeliveryResult<()> {
        let data = self.encode_to_vec(audio, bitrate)?;

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DeliveryError::Encode(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        std::fs::write(output_path, &data).map_err(|e| {
            DeliveryError::Encode(format!("cannot write {}: {}", output_path.display(), e))
        })?;

        log::info!(
            "Wrote MP3: {} ({}, {} ch, {} Hz, {} bytes)",
            output_path.display(),
            bitrate,
            audio.channels,
            audio.sample_rate,
            data.len()
        );

        Ok(())
    }

    fn extension(&self) -> &'static str {
        "mp3"
    }
}
