//! End-of-run report

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{CbrBitrate, DeliveryConfig};
use crate::dedup::DuplicateGroup;
use crate::job::{ErrorEntry, FileReport, FileStatus, FileWarning};
use crate::pipeline::{format_ms, BatchPlan};

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Plain text report
    Text,
    /// JSON report
    Json,
}

/// Aggregated outcome of one batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub input_root: PathBuf,
    pub output_root: PathBuf,

    pub target_loudness_dbfs: f64,
    pub max_segment_ms: u64,
    pub bitrate: CbrBitrate,

    /// Layout every output was written in (`None` if nothing was decodable)
    pub target_channel_count: Option<usize>,

    pub duplicates: Vec<DuplicateGroup>,

    /// One entry per discovered file, in scan order
    pub files: Vec<FileReport>,

    /// Every failure of the run
    pub errors: Vec<ErrorEntry>,

    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,

    pub elapsed: Duration,
}

impl BatchReport {
    /// Create an empty report carrying the batch decisions
    pub fn new(plan: &BatchPlan, output_root: &Path, config: &DeliveryConfig) -> Self {
        Self {
            input_root: plan.input_root.clone(),
            output_root: output_root.to_path_buf(),
            target_loudness_dbfs: config.target_loudness_dbfs,
            max_segment_ms: config.max_segment_ms(),
            bitrate: config.bitrate,
            target_channel_count: plan.policy.map(|p| p.target_channel_count),
            duplicates: plan.duplicates.groups.clone(),
            files: Vec::new(),
            errors: Vec::new(),
            total: 0,
            completed: 0,
            skipped: 0,
            failed: 0,
            cancelled: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Add a file outcome to the report
    pub fn add_file(&mut self, file: FileReport) {
        self.total += 1;
        match file.status {
            FileStatus::Completed => self.completed += 1,
            FileStatus::SkippedDuplicate { .. } => self.skipped += 1,
            FileStatus::Failed => self.failed += 1,
            FileStatus::Cancelled => self.cancelled += 1,
        }
        if let Some(error) = &file.error {
            self.errors.push(error.clone());
        }
        self.files.push(file);
    }

    /// True when no file failed or was cancelled
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    /// Number of files written across the batch
    pub fn outputs_written(&self) -> usize {
        self.files.iter().map(|f| f.outputs.len()).sum()
    }

    /// Report for one source path
    pub fn file(&self, source_path: &Path) -> Option<&FileReport> {
        self.files.iter().find(|f| f.source_path == source_path)
    }

    /// Generate report in specified format
    pub fn generate(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Text => self.to_text(),
            ReportFormat::Json => self.to_json(),
        }
    }

    /// Save report to file
    pub fn save<P: AsRef<Path>>(&self, path: P, format: ReportFormat) -> std::io::Result<()> {
        let content = self.generate(format);
        let mut file = std::fs::File::create(path)?;
        file.write_all(content.as_bytes())
    }

    fn to_text(&self) -> String {
        let title = "Delivery Report";
        let mut output = String::new();

        output.push_str(&format!("{}\n", title));
        output.push_str(&format!("{}\n\n", "=".repeat(title.len())));

        output.push_str(&format!("Input:  {}\n", self.input_root.display()));
        output.push_str(&format!("Output: {}\n", self.output_root.display()));
        output.push_str(&format!(
            "Target: {:.1} dBFS | Max segment: {} | Bitrate: {}\n",
            self.target_loudness_dbfs,
            format_ms(self.max_segment_ms),
            self.bitrate
        ));
        match self.target_channel_count {
            Some(1) => output.push_str("Channels: mono\n"),
            Some(n) => output.push_str(&format!("Channels: {}\n", n)),
            None => output.push_str("Channels: -\n"),
        }
        output.push_str(&format!(
            "Total: {} | Completed: {} | Skipped: {} | Failed: {} | Cancelled: {}\n\n",
            self.total, self.completed, self.skipped, self.failed, self.cancelled
        ));

        if !self.duplicates.is_empty() {
            output.push_str("Duplicates:\n");
            for group in &self.duplicates {
                output.push_str(&format!("  keep {}\n", group.kept().display()));
                for path in group.skipped() {
                    output.push_str(&format!("  skip {}\n", path.display()));
                }
            }
            output.push('\n');
        }

        output.push_str("Files:\n");
        output.push_str(&"-".repeat(80));
        output.push('\n');

        for file in &self.files {
            let status = match &file.status {
                FileStatus::Completed => "DONE",
                FileStatus::SkippedDuplicate { .. } => "SKIP",
                FileStatus::Failed => "FAIL",
                FileStatus::Cancelled => "STOP",
            };
            output.push_str(&format!("[{}] {}\n", status, file.source_path.display()));

            if let Some(gain) = file.applied_gain_db {
                output.push_str(&format!("  gain {:+.2} dB\n", gain));
            }
            for warning in &file.warnings {
                match warning {
                    FileWarning::Clipped { samples } => {
                        output.push_str(&format!("  ! {} samples clipped\n", samples));
                    }
                    FileWarning::SilentInput => output.push_str("  ! silent input\n"),
                }
            }
            for out in &file.outputs {
                output.push_str(&format!(
                    "  -> {} [{} - {}]\n",
                    out.path.display(),
                    format_ms(out.segment.start_ms),
                    format_ms(out.segment.end_ms)
                ));
            }
            if let FileStatus::SkippedDuplicate { kept } = &file.status {
                output.push_str(&format!("  same audio as {}\n", kept.display()));
            }
            if let Some(error) = &file.error {
                output.push_str(&format!("  x {:?}: {}\n", error.stage, error.message));
            }
        }

        output.push_str(&"-".repeat(80));
        output.push('\n');

        if !self.errors.is_empty() {
            output.push_str("Errors:\n");
            for error in &self.errors {
                output.push_str(&format!(
                    "  {} [{:?}/{:?}] {}\n",
                    error.path.display(),
                    error.stage,
                    error.kind,
                    error.message
                ));
            }
        }

        output.push_str(&format!(
            "Summary: {} files, {} outputs, {} errors in {:.1}s\n",
            self.total,
            self.outputs_written(),
            self.errors.len(),
            self.elapsed.as_secs_f64()
        ));

        output
    }

    fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".into())
    }
}
