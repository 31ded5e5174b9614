//! Configuration types for batch delivery

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, DeliveryResult};

/// Two hours, the hard per-file ceiling of the delivery platform
pub const DEFAULT_MAX_DURATION_MS: u64 = 120 * 60 * 1000;

/// Encoders may round durations up, so segments stay this far under the ceiling
pub const DEFAULT_SAFETY_MARGIN_MS: u64 = 2 * 1000;

/// Batch delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Target mean power (RMS) in dBFS
    pub target_loudness_dbfs: f64,

    /// Hard duration ceiling per output file
    pub max_duration_ms: u64,

    /// Subtracted from the ceiling to get the segment length
    pub safety_margin_ms: u64,

    /// Constant output bitrate
    pub bitrate: CbrBitrate,

    /// Extensions picked up during discovery (case-insensitive, no dot)
    pub supported_extensions: Vec<String>,

    /// Number of worker threads (0 = auto)
    pub thread_count: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            target_loudness_dbfs: -20.0,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
            safety_margin_ms: DEFAULT_SAFETY_MARGIN_MS,
            bitrate: CbrBitrate::default(),
            supported_extensions: vec!["mp3".to_string(), "wav".to_string()],
            thread_count: 0,
        }
    }
}

impl DeliveryConfig {
    /// Load config from a JSON file; absent fields keep their defaults
    pub fn from_json_file(path: &Path) -> DeliveryResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Longest segment the segmenter may produce
    pub fn max_segment_ms(&self) -> u64 {
        self.max_duration_ms.saturating_sub(self.safety_margin_ms)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> DeliveryResult<()> {
        if !self.target_loudness_dbfs.is_finite() {
            return Err(DeliveryError::InvalidConfig(format!(
                "target loudness must be finite, got {}",
                self.target_loudness_dbfs
            )));
        }

        if self.max_segment_ms() == 0 {
            return Err(DeliveryError::InvalidConfig(format!(
                "safety margin ({} ms) must be smaller than the duration ceiling ({} ms)",
                self.safety_margin_ms, self.max_duration_ms
            )));
        }

        if self.supported_extensions.is_empty() {
            return Err(DeliveryError::InvalidConfig(
                "at least one supported extension is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether a file extension is in the supported set
    pub fn is_supported_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.supported_extensions
            .iter()
            .any(|s| s.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// Set target loudness
    pub fn with_target_loudness(mut self, dbfs: f64) -> Self {
        self.target_loudness_dbfs = dbfs;
        self
    }

    /// Set duration ceiling
    pub fn with_max_duration_ms(mut self, ms: u64) -> Self {
        self.max_duration_ms = ms;
        self
    }

    /// Set safety margin
    pub fn with_safety_margin_ms(mut self, ms: u64) -> Self {
        self.safety_margin_ms = ms;
        self
    }

    /// Set output bitrate
    pub fn with_bitrate(mut self, bitrate: CbrBitrate) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Replace the supported extension set
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Set thread count
    pub fn with_threads(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }
}

/// Constant MP3 bitrate in kbps
///
/// Only the MPEG-1 Layer III rates LAME accepts for CBR are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CbrBitrate(u16);

impl CbrBitrate {
    /// Rates accepted for constant bitrate output
    pub const SUPPORTED_KBPS: [u16; 8] = [96, 112, 128, 160, 192, 224, 256, 320];

    /// Create from kbps, rejecting unsupported rates
    pub fn new(kbps: u16) -> DeliveryResult<Self> {
        if Self::SUPPORTED_KBPS.contains(&kbps) {
            Ok(Self(kbps))
        } else {
            Err(DeliveryError::InvalidConfig(format!(
                "unsupported CBR bitrate {}k (expected one of {:?})",
                kbps,
                Self::SUPPORTED_KBPS
            )))
        }
    }

    pub fn kbps(&self) -> u16 {
        self.0
    }
}

impl Default for CbrBitrate {
    fn default() -> Self {
        Self(192)
    }
}

impl fmt::Display for CbrBitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.0)
    }
}

impl FromStr for CbrBitrate {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_suffix('k')
            .or_else(|| trimmed.strip_suffix('K'))
            .unwrap_or(trimmed);
        let kbps = digits
            .parse::<u16>()
            .map_err(|_| DeliveryError::InvalidConfig(format!("invalid bitrate: {:?}", s)))?;
        Self::new(kbps)
    }
}

impl TryFrom<String> for CbrBitrate {
    type Error = DeliveryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CbrBitrate> for String {
    fn from(value: CbrBitrate) -> Self {
        value.to_string()
    }
}
