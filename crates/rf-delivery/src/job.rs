//! Per-file results

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, ErrorKind};
use crate::segment::Segment;

/// Pipeline stage a file was in when something happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Scan,
    Plan,
    Decode,
    ChannelConversion,
    Encode,
}

/// Final status of one discovered file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    /// Every segment was written
    Completed,
    /// Byte-identical to an earlier file in scan order
    SkippedDuplicate { kept: PathBuf },
    /// Stopped by an error, see the report's error list
    Failed,
    /// Batch was cancelled before this file started
    Cancelled,
}

/// Non-fatal conditions worth surfacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FileWarning {
    /// Gain pushed samples past full scale; they were clamped
    Clipped { samples: u64 },
    /// No measurable power; gain was not applied
    SilentInput,
}

/// One written output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: PathBuf,
    pub segment: Segment,
}

/// One reported failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub path: PathBuf,
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(path: impl Into<PathBuf>, stage: Stage, error: &DeliveryError) -> Self {
        Self {
            path: path.into(),
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Structured outcome for one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub source_path: PathBuf,
    pub status: FileStatus,
    /// Channel count before conversion
    pub source_channels: Option<usize>,
    pub applied_gain_db: Option<f64>,
    pub warnings: Vec<FileWarning>,
    pub outputs: Vec<OutputFile>,
    pub error: Option<ErrorEntry>,
    pub elapsed: Duration,
}

impl FileReport {
    fn base(source_path: PathBuf, status: FileStatus) -> Self {
        Self {
            source_path,
            status,
            source_channels: None,
            applied_gain_db: None,
            warnings: Vec::new(),
            outputs: Vec::new(),
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Create a report for a file that is about to be processed
    pub fn started(source_path: PathBuf) -> Self {
        Self::base(source_path, FileStatus::Completed)
    }

    pub fn skipped_duplicate(source_path: PathBuf, kept: PathBuf) -> Self {
        Self::base(source_path, FileStatus::SkippedDuplicate { kept })
    }

    pub fn cancelled(source_path: PathBuf) -> Self {
        Self::base(source_path, FileStatus::Cancelled)
    }

    /// Create a failed report outside the transform phase
    pub fn failed(source_path: PathBuf, stage: Stage, error: &DeliveryError) -> Self {
        let mut report = Self::base(source_path.clone(), FileStatus::Failed);
        report.error = Some(ErrorEntry::new(source_path, stage, error));
        report
    }

    /// Mark as failed, keeping any outputs already written
    pub fn fail(&mut self, stage: Stage, error: &DeliveryError) {
        self.status = FileStatus::Failed;
        self.error = Some(ErrorEntry::new(self.source_path.clone(), stage, error));
    }

    pub fn is_failed(&self) -> bool {
        self.status == FileStatus::Failed
    }
}
