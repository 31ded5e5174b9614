//! Content digests over decoded PCM
//!
//! SHA-256 over the interleaved decoded samples at full precision (f64,
//! little-endian). Channel count, sample rate and container metadata are not
//! part of the digest.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::pipeline::AudioBuffer;

/// Fixed-length digest of decoded audio content
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 bytes as hex, for logs
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.short_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Computes content digests
pub struct ContentHasher;

impl ContentHasher {
    /// Digest of raw PCM bytes
    pub fn hash(pcm_bytes: &[u8]) -> ContentDigest {
        let mut hasher = Sha256::new();
        hasher.update(pcm_bytes);
        Self::finish(hasher)
    }

    /// Digest of a decoded buffer
    ///
    /// Streams the same bytes [`AudioBuffer::to_sample_bytes`] would produce,
    /// without materializing them.
    pub fn hash_buffer(buffer: &AudioBuffer) -> ContentDigest {
        let mut hasher = Sha256::new();
        let mut block = Vec::with_capacity(4096 * 8);

        for chunk in buffer.samples.chunks(4096) {
            block.clear();
            for &sample in chunk {
                block.extend_from_slice(&sample.to_le_bytes());
            }
            hasher.update(&block);
        }

        Self::finish(hasher)
    }

    fn finish(hasher: Sha256) -> ContentDigest {
        let result = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        ContentDigest(digest)
    }
}
