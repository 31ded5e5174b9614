//! Discovery and per-file analysis

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::decoder::SampleSource;
use crate::error::{DeliveryError, DeliveryResult};
use crate::hash::{ContentDigest, ContentHasher};

/// Analysis result for one discovered file
///
/// Built once during the scan and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRecord {
    pub source_path: PathBuf,
    pub duration_ms: u64,
    pub channel_count: usize,
    pub sample_rate: u32,
    /// Mean power (RMS) in dBFS; `-inf` for silence
    pub mean_power_dbfs: f64,
    pub content_digest: ContentDigest,
}

/// Recursively list supported audio files under `root`
///
/// Entries are sorted by file name at every directory level so the scan order
/// is stable across runs.
pub fn discover(root: &Path, extensions: &[String]) -> DeliveryResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(DeliveryError::InputNotFound(root.display().to_string()));
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                extensions
                    .iter()
                    .any(|s| s.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false);

        if supported {
            files.push(entry.into_path());
        }
    }

    log::debug!("Discovered {} audio files under {}", files.len(), root.display());
    Ok(files)
}

/// Decode one file and build its record
pub fn analyze(source: &dyn SampleSource, path: &Path) -> DeliveryResult<AudioRecord> {
    let buffer = source.decode(path)?;
    let content_digest = ContentHasher::hash_buffer(&buffer);

    let record = AudioRecord {
        source_path: path.to_path_buf(),
        duration_ms: buffer.duration_ms(),
        channel_count: buffer.channels,
        sample_rate: buffer.sample_rate,
        mean_power_dbfs: buffer.rms_dbfs(),
        content_digest,
    };

    log::debug!(
        "Analyzed {}: {} ms, {} ch, {:.1} dBFS, digest {}",
        path.display(),
        record.duration_ms,
        record.channel_count,
        record.mean_power_dbfs,
        record.content_digest.short_hex()
    );

    Ok(record)
}
