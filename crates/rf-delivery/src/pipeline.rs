//! Main batch pipeline
//!
//! Orchestrates one delivery run:
//! 1. Discover and analyze every source (decode, digest, measure)
//! 2. Resolve duplicates across the batch
//! 3. Fix the target channel layout for the batch
//! 4. Resolve every output path up front and reject collisions
//! 5. Per surviving file, in parallel: decode, convert channels, normalize,
//!    segment and encode

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::channels::{BatchPolicy, ChannelPolicy};
use crate::config::DeliveryConfig;
use crate::decoder::{SampleSource, SymphoniaSource};
use crate::dedup::{DuplicateReport, DuplicateResolver};
use crate::encoder::{LameMp3Sink, SampleSink};
use crate::error::{DeliveryError, DeliveryResult};
use crate::job::{FileReport, FileWarning, OutputFile, Stage};
use crate::naming::{ExportNamer, ExportPlan, ExportTarget};
use crate::normalize::{linear_to_db, LoudnessNormalizer};
use crate::report::BatchReport;
use crate::scan::{self, AudioRecord};
use crate::segment::Segmenter;

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIO BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// Quantize a sample to 16-bit PCM, saturating at full scale
pub fn sample_to_pcm16(sample: f64) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Decoded audio (f64, interleaved, full scale = 1.0)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples
    pub samples: Vec<f64>,
    /// Number of channels
    pub channels: usize,
    /// Sample rate
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create empty buffer
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            channels,
            sample_rate,
        }
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Duration rounded to the nearest millisecond
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let rate = self.sample_rate as u64;
        (self.frames() as u64 * 1000 + rate / 2) / rate
    }

    /// Mix down to mono by averaging channels
    pub fn to_mono(&self) -> AudioBuffer {
        if self.channels <= 1 {
            return self.clone();
        }

        let mono = self
            .samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f64>() / self.channels as f64)
            .collect();

        AudioBuffer {
            samples: mono,
            channels: 1,
            sample_rate: self.sample_rate,
        }
    }

    /// Copy a mono signal into `channels` identical channels
    pub fn upmix_mono(&self, channels: usize) -> AudioBuffer {
        if self.channels != 1 || channels <= 1 {
            return self.clone();
        }

        let mut out = Vec::with_capacity(self.samples.len() * channels);
        for &sample in &self.samples {
            out.extend(std::iter::repeat(sample).take(channels));
        }

        AudioBuffer {
            samples: out,
            channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Borrow the whole buffer
    pub fn as_slice(&self) -> AudioSlice<'_> {
        AudioSlice {
            samples: &self.samples,
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Borrow a frame range (clamped to the buffer)
    pub fn frame_slice(&self, frames: Range<usize>) -> AudioSlice<'_> {
        let end = frames.end.min(self.frames());
        let start = frames.start.min(end);

        AudioSlice {
            samples: &self.samples[start * self.channels..end * self.channels],
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Get peak level (linear)
    pub fn peak(&self) -> f64 {
        self.samples.iter().map(|s| s.abs()).fold(0.0, f64::max)
    }

    /// Root mean square over all samples (linear)
    pub fn rms(&self) -> f64 {
        self.as_slice().rms()
    }

    /// Mean power in dBFS (`-inf` for silence)
    pub fn rms_dbfs(&self) -> f64 {
        self.as_slice().rms_dbfs()
    }

    /// Interleaved samples as full-precision little-endian f64 bytes
    pub fn to_sample_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 8);
        for &sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

/// Borrowed run of interleaved frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSlice<'a> {
    pub samples: &'a [f64],
    pub channels: usize,
    pub sample_rate: u32,
}

impl AudioSlice<'_> {
    /// Number of frames
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Root mean square over all samples (linear)
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|s| s * s).sum();
        (sum / self.samples.len() as f64).sqrt()
    }

    /// Mean power in dBFS (`-inf` for silence)
    pub fn rms_dbfs(&self) -> f64 {
        linear_to_db(self.rms())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH PLAN
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of scanning one discovered path
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Analyzed(AudioRecord),
    Failed(FileReport),
}

/// Every batch-wide decision, made before any file is transformed
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub input_root: PathBuf,
    /// One entry per discovered path, in scan order
    pub scanned: Vec<ScanOutcome>,
    pub duplicates: DuplicateReport,
    /// `None` when no file could be analyzed
    pub policy: Option<BatchPolicy>,
    pub exports: ExportPlan,
}

impl BatchPlan {
    /// Records that will be transformed, in scan order
    pub fn survivors(&self) -> Vec<&AudioRecord> {
        self.scanned
            .iter()
            .filter_map(|outcome| match outcome {
                ScanOutcome::Analyzed(record)
                    if !self.duplicates.is_skipped(&record.source_path) =>
                {
                    Some(record)
                }
                _ => None,
            })
            .collect()
    }

    /// Human-readable summary of the batch decisions
    pub fn describe(&self) -> String {
        let mut output = String::new();

        output.push_str(&self.duplicates.describe());
        match self.policy {
            Some(policy) => {
                output.push_str(&format!("Converting all files to {}\n", policy.label()))
            }
            None => output.push_str("No decodable files; nothing to convert\n"),
        }

        for record in self.survivors() {
            output.push_str(&format!("{}\n", record.source_path.display()));
            for target in self.exports.targets_for(&record.source_path).unwrap_or(&[]) {
                output.push_str(&format!(
                    "  -> {} [{} - {}]\n",
                    target.relative_path.display(),
                    format_ms(target.segment.start_ms),
                    format_ms(target.segment.end_ms)
                ));
            }
        }

        output
    }
}

/// `h:mm:ss.mmm`
pub fn format_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!(
        "{}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms % 1000
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH PROCESSOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs a whole delivery batch on a bounded worker pool
pub struct BatchProcessor {
    config: DeliveryConfig,
    source: Arc<dyn SampleSource>,
    sink: Arc<dyn SampleSink>,
    normalizer: LoudnessNormalizer,
    segmenter: Segmenter,
    cancelled: Arc<AtomicBool>,
}

impl BatchProcessor {
    /// Create processor with explicit codec collaborators
    pub fn new<S, K>(config: DeliveryConfig, source: S, sink: K) -> DeliveryResult<Self>
    where
        S: SampleSource + 'static,
        K: SampleSink + 'static,
    {
        config.validate()?;

        Ok(Self {
            normalizer: LoudnessNormalizer::new(config.target_loudness_dbfs),
            segmenter: Segmenter::new(config.max_segment_ms())?,
            config,
            source: Arc::new(source),
            sink: Arc::new(sink),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create processor with symphonia decoding and LAME MP3 output
    pub fn with_defaults(config: DeliveryConfig) -> DeliveryResult<Self> {
        Self::new(config, SymphoniaSource::new(), LameMp3Sink::new())
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Share an externally owned cancel flag
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    /// Cancel processing; files already running finish
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Get cancel flag for sharing
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    fn thread_pool(&self) -> DeliveryResult<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.thread_count)
            .build()
            .map_err(|e| DeliveryError::InvalidConfig(format!("cannot build worker pool: {}", e)))
    }

    /// Discover sources under `input_root` and plan the batch
    pub fn plan(&self, input_root: &Path) -> DeliveryResult<BatchPlan> {
        let paths = scan::discover(input_root, &self.config.supported_extensions)?;
        let pool = self.thread_pool()?;
        pool.install(|| self.plan_paths(input_root, paths))
    }

    /// Plan the batch for an externally discovered, ordered path list
    pub fn plan_paths(&self, input_root: &Path, paths: Vec<PathBuf>) -> DeliveryResult<BatchPlan> {
        if paths.is_empty() {
            return Err(DeliveryError::PolicyViolation(format!(
                "no supported audio files under {}",
                input_root.display()
            )));
        }

        // Indexed collect keeps scan order
        let scanned: Vec<ScanOutcome> = paths
            .into_par_iter()
            .map(|path| match scan::analyze(self.source.as_ref(), &path) {
                Ok(record) => ScanOutcome::Analyzed(record),
                Err(e) => {
                    log::warn!("Could not open {}: {}", path.display(), e);
                    ScanOutcome::Failed(FileReport::failed(path, Stage::Scan, &e))
                }
            })
            .collect();

        if self.is_cancelled() {
            return Err(DeliveryError::Cancelled);
        }

        let records: Vec<AudioRecord> = scanned
            .iter()
            .filter_map(|outcome| match outcome {
                ScanOutcome::Analyzed(record) => Some(record.clone()),
                ScanOutcome::Failed(_) => None,
            })
            .collect();

        let duplicates = DuplicateResolver::resolve(&records);
        if !duplicates.groups.is_empty() {
            log::warn!("{}", duplicates.describe().trim_end());
        }

        let survivors = DuplicateResolver::survivors(&records, &duplicates);

        let (policy, exports) = if records.is_empty() {
            (None, ExportPlan::default())
        } else {
            let policy = ChannelPolicy::decide(survivors.iter().copied())?;
            log::info!("Converting all files to {}", policy.label());

            let namer = ExportNamer::new(input_root, self.sink.extension());
            let exports = ExportPlan::build(survivors.iter().copied(), &namer, &self.segmenter)?;
            log::debug!(
                "Planned {} outputs for {} files",
                exports.output_count(),
                survivors.len()
            );
            (Some(policy), exports)
        };

        Ok(BatchPlan {
            input_root: input_root.to_path_buf(),
            scanned,
            duplicates,
            policy,
            exports,
        })
    }

    /// Discover, plan and process everything under `input_root`
    pub fn run(&self, input_root: &Path, output_root: &Path) -> DeliveryResult<BatchReport> {
        let paths = scan::discover(input_root, &self.config.supported_extensions)?;
        self.run_paths(input_root, output_root, paths)
    }

    /// Plan and process an externally discovered, ordered path list
    pub fn run_paths(
        &self,
        input_root: &Path,
        output_root: &Path,
        paths: Vec<PathBuf>,
    ) -> DeliveryResult<BatchReport> {
        let start = Instant::now();
        let pool = self.thread_pool()?;

        pool.install(|| {
            let plan = self.plan_paths(input_root, paths)?;
            let files = self.execute(&plan, output_root);

            let mut report = BatchReport::new(&plan, output_root, &self.config);
            for file in files {
                report.add_file(file);
            }
            report.elapsed = start.elapsed();

            log::info!(
                "Batch done: {} completed, {} skipped, {} failed, {} outputs in {:.1}s",
                report.completed,
                report.skipped,
                report.failed,
                report.outputs_written(),
                report.elapsed.as_secs_f64()
            );

            Ok(report)
        })
    }

    /// Per-file phase; one report per scanned path, in scan order
    fn execute(&self, plan: &BatchPlan, output_root: &Path) -> Vec<FileReport> {
        plan.scanned
            .par_iter()
            .map(|outcome| match outcome {
                ScanOutcome::Failed(report) => report.clone(),
                ScanOutcome::Analyzed(record) => {
                    if let Some(kept) = plan.duplicates.kept_for(&record.source_path) {
                        log::info!(
                            "Skipping duplicate: {} (same audio as {})",
                            record.source_path.display(),
                            kept.display()
                        );
                        return FileReport::skipped_duplicate(
                            record.source_path.clone(),
                            kept.to_path_buf(),
                        );
                    }

                    match (plan.policy, plan.exports.targets_for(&record.source_path)) {
                        (Some(policy), Some(targets)) => {
                            self.process_file(record, targets, policy, output_root)
                        }
                        _ => FileReport::failed(
                            record.source_path.clone(),
                            Stage::Plan,
                            &DeliveryError::PolicyViolation(format!(
                                "{} has no export plan",
                                record.source_path.display()
                            )),
                        ),
                    }
                }
            })
            .collect()
    }

    /// Transform one surviving file; never aborts the batch
    pub fn process_file(
        &self,
        record: &AudioRecord,
        targets: &[ExportTarget],
        policy: BatchPolicy,
        output_root: &Path,
    ) -> FileReport {
        if self.is_cancelled() {
            return FileReport::cancelled(record.source_path.clone());
        }

        let start = Instant::now();
        let mut report = FileReport::started(record.source_path.clone());
        report.source_channels = Some(record.channel_count);

        log::info!("Processing: {}", record.source_path.display());

        if let Err((stage, e)) = self.transform(record, targets, policy, output_root, &mut report) {
            log::warn!("{} failed at {:?}: {}", record.source_path.display(), stage, e);
            report.fail(stage, &e);
        }

        report.elapsed = start.elapsed();
        report
    }

    fn transform(
        &self,
        record: &AudioRecord,
        targets: &[ExportTarget],
        policy: BatchPolicy,
        output_root: &Path,
        report: &mut FileReport,
    ) -> Result<(), (Stage, DeliveryError)> {
        let path = record.source_path.as_path();

        let buffer = self.source.decode(path).map_err(|e| (Stage::Decode, e))?;

        if buffer.duration_ms() != record.duration_ms {
            log::warn!(
                "{}: decoded length {} ms differs from scan ({} ms)",
                path.display(),
                buffer.duration_ms(),
                record.duration_ms
            );
        }

        // Loudness is measured on the layout that ships
        let mut buffer = if buffer.channels != policy.target_channel_count {
            let from = buffer.channels;
            let converted = self
                .source
                .set_channels(path, buffer, policy.target_channel_count)
                .map_err(|e| (Stage::ChannelConversion, e))?;
            log::info!("   Channels: {} -> {}", from, converted.channels);
            converted
        } else {
            buffer
        };

        let outcome = self.normalizer.normalize(&mut buffer);
        report.applied_gain_db = Some(outcome.applied_gain_db);

        if outcome.silent {
            log::warn!("{}: silent input, gain not applied", path.display());
            report.warnings.push(FileWarning::SilentInput);
        } else {
            log::info!(
                "   Gain: {:+.1} dB (new level {:.1} dBFS)",
                outcome.applied_gain_db,
                buffer.rms_dbfs()
            );
        }

        if outcome.clipped() {
            log::warn!(
                "{}: {} samples clipped at full scale",
                path.display(),
                outcome.clipped_samples
            );
            report.warnings.push(FileWarning::Clipped {
                samples: outcome.clipped_samples,
            });
        }

        if targets.len() > 1 {
            log::info!(
                "   Split into {} segments (max {})",
                targets.len(),
                format_ms(self.segmenter.max_segment_ms())
            );
        }

        let total_frames = buffer.frames();
        for (i, target) in targets.iter().enumerate() {
            let frames = target
                .segment
                .frame_range(buffer.sample_rate, total_frames, i + 1 == targets.len());
            let output_path = output_root.join(&target.relative_path);

            // Segments borrow the decoded buffer; nothing is copied per part
            self.sink
                .encode(buffer.frame_slice(frames), &output_path, self.config.bitrate)
                .map_err(|e| (Stage::Encode, e))?;

            report.outputs.push(OutputFile {
                path: output_path,
                segment: target.segment,
            });
        }

        Ok(())
    }
}
