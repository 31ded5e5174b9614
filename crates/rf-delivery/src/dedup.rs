//! Duplicate detection by content digest
//!
//! Records are grouped by digest in scan order. The first record of each
//! group is kept and every later one is skipped, so the same scan order
//! always yields the same partition.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hash::ContentDigest;
use crate::scan::AudioRecord;

/// Files sharing one digest (always two or more)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub digest: ContentDigest,
    /// Paths in scan order; the first one is kept
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Representative that survives
    pub fn kept(&self) -> &Path {
        &self.paths[0]
    }

    /// Members marked as skipped
    pub fn skipped(&self) -> &[PathBuf] {
        &self.paths[1..]
    }
}

/// Outcome of duplicate resolution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub kept: HashSet<PathBuf>,
    pub skipped: HashSet<PathBuf>,
    pub groups: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    pub fn is_skipped(&self, path: &Path) -> bool {
        self.skipped.contains(path)
    }

    /// Kept representative for a skipped path
    pub fn kept_for(&self, path: &Path) -> Option<&Path> {
        self.groups
            .iter()
            .find(|g| g.skipped().iter().any(|p| p == path))
            .map(|g| g.kept())
    }

    /// Human-readable listing of duplicate groups
    pub fn describe(&self) -> String {
        if self.groups.is_empty() {
            return "No duplicate files detected.\n".to_string();
        }

        let mut output = format!(
            "Duplicate files detected ({} groups, {} skipped):\n",
            self.groups.len(),
            self.skipped.len()
        );
        for group in &self.groups {
            output.push_str(&format!("  keep {}\n", group.kept().display()));
            for path in group.skipped() {
                output.push_str(&format!("  skip {}\n", path.display()));
            }
        }
        output
    }
}

/// Groups records by digest and picks one representative per group
pub struct DuplicateResolver;

impl DuplicateResolver {
    /// Resolve duplicates across `records`, which must be in scan order
    pub fn resolve(records: &[AudioRecord]) -> DuplicateReport {
        // digest -> index into `order`, so groups come out in first-seen order
        let mut index: HashMap<ContentDigest, usize> = HashMap::new();
        let mut order: Vec<(ContentDigest, Vec<&Path>)> = Vec::new();

        for record in records {
            match index.get(&record.content_digest) {
                Some(&i) => order[i].1.push(&record.source_path),
                None => {
                    index.insert(record.content_digest, order.len());
                    order.push((record.content_digest, vec![record.source_path.as_path()]));
                }
            }
        }

        let mut report = DuplicateReport::default();

        for (digest, paths) in order {
            if paths.len() < 2 {
                continue;
            }

            report.kept.insert(paths[0].to_path_buf());
            for path in &paths[1..] {
                report.skipped.insert(path.to_path_buf());
            }

            report.groups.push(DuplicateGroup {
                digest,
                paths: paths.into_iter().map(Path::to_path_buf).collect(),
            });
        }

        report
    }

    /// Records that survive duplicate resolution, in scan order
    pub fn survivors<'a>(
        records: &'a [AudioRecord],
        report: &DuplicateReport,
    ) -> Vec<&'a AudioRecord> {
        records
            .iter()
            .filter(|r| !report.is_skipped(&r.source_path))
            .collect()
    }
}
