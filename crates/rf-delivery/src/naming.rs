//! Output naming and collision checks

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, DeliveryResult};
use crate::scan::AudioRecord;
use crate::segment::{Segment, Segmenter};

/// One output file to be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTarget {
    /// Path relative to the output root
    pub relative_path: PathBuf,
    pub segment: Segment,
}

/// Derives output paths from source paths
#[derive(Debug, Clone)]
pub struct ExportNamer {
    input_root: PathBuf,
    extension: String,
}

impl ExportNamer {
    pub fn new<P: Into<PathBuf>>(input_root: P, extension: &str) -> Self {
        Self {
            input_root: input_root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Output path relative to the output root
    ///
    /// Keeps the source's directory structure, replaces its extension and
    /// adds `_part{index}` only when the file is split.
    pub fn name(
        &self,
        source_path: &Path,
        segment_index: usize,
        segment_count: usize,
    ) -> DeliveryResult<PathBuf> {
        let relative = source_path.strip_prefix(&self.input_root).map_err(|_| {
            DeliveryError::PolicyViolation(format!(
                "{} is not under input root {}",
                source_path.display(),
                self.input_root.display()
            ))
        })?;

        let stem = relative
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                DeliveryError::PolicyViolation(format!(
                    "cannot derive an output name for {}",
                    source_path.display()
                ))
            })?;

        let file_name = if segment_count > 1 {
            format!("{}_part{}.{}", stem, segment_index, self.extension)
        } else {
            format!("{}.{}", stem, self.extension)
        };

        Ok(match relative.parent() {
            Some(parent) => parent.join(file_name),
            None => PathBuf::from(file_name),
        })
    }

    /// All targets for one file
    pub fn targets(
        &self,
        source_path: &Path,
        segments: &[Segment],
    ) -> DeliveryResult<Vec<ExportTarget>> {
        segments
            .iter()
            .map(|segment| {
                Ok(ExportTarget {
                    relative_path: self.name(source_path, segment.index, segments.len())?,
                    segment: *segment,
                })
            })
            .collect()
    }
}

/// Every output of the run, resolved before anything is written
#[derive(Debug, Clone, Default)]
pub struct ExportPlan {
    targets: HashMap<PathBuf, Vec<ExportTarget>>,
}

impl ExportPlan {
    /// Resolve targets for all survivors, failing on any path collision
    pub fn build<'a, I>(
        records: I,
        namer: &ExportNamer,
        segmenter: &Segmenter,
    ) -> DeliveryResult<Self>
    where
        I: IntoIterator<Item = &'a AudioRecord>,
    {
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut targets = HashMap::new();

        for record in records {
            let segments = segmenter.segments(record.duration_ms);
            let file_targets = namer.targets(&record.source_path, &segments)?;

            for target in &file_targets {
                // Case-insensitive filesystems map `Book.mp3` and `book.mp3` to one file
                let key = PathBuf::from(target.relative_path.to_string_lossy().to_lowercase());
                if let Some(other) = claimed.insert(key, record.source_path.clone()) {
                    return Err(DeliveryError::PolicyViolation(format!(
                        "{} and {} both resolve to output {}",
                        other.display(),
                        record.source_path.display(),
                        target.relative_path.display()
                    )));
                }
            }

            targets.insert(record.source_path.clone(), file_targets);
        }

        Ok(Self { targets })
    }

    /// Targets for one source file
    pub fn targets_for(&self, source_path: &Path) -> Option<&[ExportTarget]> {
        self.targets.get(source_path).map(Vec::as_slice)
    }

    /// Total number of output files
    pub fn output_count(&self) -> usize {
        self.targets.values().map(Vec::len).sum()
    }
}
