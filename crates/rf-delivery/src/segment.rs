//! Time-bounded segmentation

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, DeliveryResult};

/// Contiguous slice of one file's audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// 1-based position within the file
    pub index: usize,
    pub start_ms: u64,
    /// Exclusive
    pub end_ms: u64,
}

impl Segment {
    pub fn len_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }

    /// Frame range for this segment
    ///
    /// Boundaries map to `ms * rate / 1000` frames. The final segment always
    /// runs to `total_frames` so a sub-millisecond tail is never lost.
    pub fn frame_range(
        &self,
        sample_rate: u32,
        total_frames: usize,
        is_last: bool,
    ) -> Range<usize> {
        let to_frame = |ms: u64| -> usize {
            let frame = ms as u128 * sample_rate as u128 / 1000;
            (frame.min(total_frames as u128)) as usize
        };

        let start = to_frame(self.start_ms);
        let end = if is_last { total_frames } else { to_frame(self.end_ms) };
        start..end.max(start)
    }
}

/// Splits durations into segments no longer than a ceiling
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    max_segment_ms: u64,
}

impl Segmenter {
    pub fn new(max_segment_ms: u64) -> DeliveryResult<Self> {
        if max_segment_ms == 0 {
            return Err(DeliveryError::InvalidConfig(
                "segment length must be greater than zero milliseconds".to_string(),
            ));
        }
        Ok(Self { max_segment_ms })
    }

    pub fn max_segment_ms(&self) -> u64 {
        self.max_segment_ms
    }

    /// Number of segments for a duration (at least one)
    pub fn count(&self, duration_ms: u64) -> usize {
        duration_ms.div_ceil(self.max_segment_ms).max(1) as usize
    }

    /// Ordered, gap-free segments covering `[0, duration_ms)`
    pub fn segments(&self, duration_ms: u64) -> Vec<Segment> {
        let count = self.count(duration_ms);

        (0..count)
            .map(|i| {
                let start_ms = i as u64 * self.max_segment_ms;
                let end_ms = ((i as u64 + 1) * self.max_segment_ms).min(duration_ms);
                Segment {
                    index: i + 1,
                    start_ms: start_ms.min(duration_ms),
                    end_ms,
                }
            })
            .collect()
    }
}
