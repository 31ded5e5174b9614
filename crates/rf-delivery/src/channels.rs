//! Batch-wide channel layout policy

use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, DeliveryResult};
use crate::scan::AudioRecord;

/// Decisions fixed for the whole run before any file is transformed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPolicy {
    /// 1 (mono) or 2 (stereo)
    pub target_channel_count: usize,
}

impl BatchPolicy {
    pub fn label(&self) -> &'static str {
        if self.target_channel_count == 2 {
            "stereo (2ch)"
        } else {
            "mono (1ch)"
        }
    }
}

/// Derives the target channel count from surviving records
pub struct ChannelPolicy;

impl ChannelPolicy {
    /// Stereo if any survivor has more than one channel, otherwise mono
    ///
    /// An empty survivor list means nothing was kept, which cannot happen for
    /// a non-empty input and is reported as a policy violation.
    pub fn decide<'a, I>(survivors: I) -> DeliveryResult<BatchPolicy>
    where
        I: IntoIterator<Item = &'a AudioRecord>,
    {
        let mut any = false;
        let mut multichannel = false;

        for record in survivors {
            any = true;
            if record.channel_count > 1 {
                multichannel = true;
            }
        }

        if !any {
            return Err(DeliveryError::PolicyViolation(
                "no surviving records to derive a channel layout from".to_string(),
            ));
        }

        Ok(BatchPolicy {
            target_channel_count: if multichannel { 2 } else { 1 },
        })
    }
}
