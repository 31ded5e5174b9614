//! Mean-power loudness normalization
//!
//! Gain is `target - measured`, measured as RMS dBFS on the layout that will
//! actually ship. Samples pushed past full scale are clipped, never wrapped,
//! and the clip count is reported back to the caller.

use serde::{Deserialize, Serialize};

use crate::pipeline::AudioBuffer;

/// Result of one normalization pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainOutcome {
    /// Gain actually applied (0.0 for silent input)
    pub applied_gain_db: f64,
    /// Samples clamped to full scale
    pub clipped_samples: u64,
    /// Input had no measurable power, gain was skipped
    pub silent: bool,
}

impl GainOutcome {
    pub fn clipped(&self) -> bool {
        self.clipped_samples > 0
    }
}

/// Applies a fixed target loudness
#[derive(Debug, Clone, Copy)]
pub struct LoudnessNormalizer {
    target_dbfs: f64,
}

impl LoudnessNormalizer {
    pub fn new(target_dbfs: f64) -> Self {
        Self { target_dbfs }
    }

    pub fn target_dbfs(&self) -> f64 {
        self.target_dbfs
    }

    /// Gain needed to move `measured_dbfs` to the target
    ///
    /// `None` when the input is silent (or otherwise has no finite level).
    pub fn gain_db(&self, measured_dbfs: f64) -> Option<f64> {
        if measured_dbfs.is_finite() {
            Some(self.target_dbfs - measured_dbfs)
        } else {
            None
        }
    }

    /// Measure and normalize in place
    pub fn normalize(&self, buffer: &mut AudioBuffer) -> GainOutcome {
        let measured = buffer.rms_dbfs();
        self.normalize_measured(buffer, measured)
    }

    /// Normalize in place using an already measured level
    pub fn normalize_measured(&self, buffer: &mut AudioBuffer, measured_dbfs: f64) -> GainOutcome {
        let Some(gain_db) = self.gain_db(measured_dbfs) else {
            return GainOutcome {
                applied_gain_db: 0.0,
                clipped_samples: 0,
                silent: true,
            };
        };

        let gain = db_to_linear(gain_db);
        let mut clipped_samples = 0u64;

        for sample in buffer.samples.iter_mut() {
            let scaled = *sample * gain;
            if scaled.abs() > 1.0 {
                clipped_samples += 1;
                *sample = scaled.clamp(-1.0, 1.0);
            } else {
                *sample = scaled;
            }
        }

        GainOutcome {
            applied_gain_db: gain_db,
            clipped_samples,
            silent: false,
        }
    }
}

/// Convert dB to linear gain
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear amplitude to dB (`-inf` for zero)
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}
