//! Batch Integration Tests
//!
//! Runs whole batches through in-memory codec doubles.
//! Verifies:
//! - Duplicate skipping and batch channel layout
//! - Loudness, splitting and output naming together
//! - Per-file failure isolation
//! - Collision rejection before any write
//! - Cancellation

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;

use rf_delivery::{
    AudioBuffer, AudioSlice, BatchProcessor, CbrBitrate, DeliveryConfig, DeliveryError,
    DeliveryResult, ErrorKind, FileStatus, FileWarning, SampleSink, SampleSource, Stage,
};

/// Low rate keeps 200-minute fixtures small
const SAMPLE_RATE: u32 = 10;
const MINUTE_FRAMES: usize = 60 * SAMPLE_RATE as usize;

// ═══════════════════════════════════════════════════════════════════════════════
// TEST DOUBLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Decoder serving prepared buffers by path
#[derive(Default)]
struct MemorySource {
    files: HashMap<PathBuf, AudioBuffer>,
    decodes: Mutex<HashMap<PathBuf, usize>>,
    /// Raised on the second decode of `cancel_on`
    cancel: Option<(PathBuf, Arc<AtomicBool>)>,
}

impl MemorySource {
    fn with(mut self, path: &str, buffer: AudioBuffer) -> Self {
        self.files.insert(PathBuf::from(path), buffer);
        self
    }
}

impl SampleSource for MemorySource {
    fn decode(&self, path: &Path) -> DeliveryResult<AudioBuffer> {
        let count = {
            let mut decodes = self.decodes.lock().unwrap();
            let count = decodes.entry(path.to_path_buf()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some((trigger, flag)) = &self.cancel {
            if trigger == path && count == 2 {
                flag.store(true, Ordering::SeqCst);
            }
        }

        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| DeliveryError::Decode(format!("{}: corrupt header", path.display())))
    }
}

#[derive(Debug, Clone)]
struct Written {
    path: PathBuf,
    channels: usize,
    frames: usize,
    rms_dbfs: f64,
    bitrate: CbrBitrate,
}

/// Encoder recording what it was asked to write
#[derive(Clone, Default)]
struct RecordingSink {
    written: Arc<Mutex<Vec<Written>>>,
    fail_suffix: Option<&'static str>,
}

impl RecordingSink {
    fn failing_on(suffix: &'static str) -> Self {
        Self {
            written: Arc::default(),
            fail_suffix: Some(suffix),
        }
    }

    fn written(&self) -> Vec<Written> {
        let mut written = self.written.lock().unwrap().clone();
        written.sort_by(|a, b| a.path.cmp(&b.path));
        written
    }

    fn find(&self, path: &str) -> Option<Written> {
        self.written().into_iter().find(|w| w.path == Path::new(path))
    }
}

impl SampleSink for RecordingSink {
    fn encode(
        &self,
        audio: AudioSlice<'_>,
        output_path: &Path,
        bitrate: CbrBitrate,
    ) -> DeliveryResult<()> {
        if let Some(suffix) = self.fail_suffix {
            if output_path.to_string_lossy().ends_with(suffix) {
                return Err(DeliveryError::Encode("disk full".into()));
            }
        }

        self.written.lock().unwrap().push(Written {
            path: output_path.to_path_buf(),
            channels: audio.channels,
            frames: audio.frames(),
            rms_dbfs: audio.rms_dbfs(),
            bitrate,
        });
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "mp3"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Square wave with exact mean power
fn square(channels: usize, frames: usize, dbfs: f64) -> AudioBuffer {
    let amplitude = 10f64.powf(dbfs / 20.0);
    let samples = (0..frames)
        .flat_map(|i| {
            let s = if i % 2 == 0 { amplitude } else { -amplitude };
            std::iter::repeat(s).take(channels)
        })
        .collect();

    AudioBuffer {
        samples,
        channels,
        sample_rate: SAMPLE_RATE,
    }
}

fn paths(list: &[&str]) -> Vec<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}

fn single_threaded() -> DeliveryConfig {
    DeliveryConfig::default().with_threads(1)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FULL BATCH
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_mixed_batch_end_to_end() {
    let b = square(2, 200 * MINUTE_FRAMES, -15.0);
    let source = MemorySource::default()
        .with("/in/fileA.wav", square(1, 10 * MINUTE_FRAMES, -30.0))
        .with("/in/fileB.mp3", b.clone())
        .with("/in/fileC.mp3", b);
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(DeliveryConfig::default(), source, sink.clone()).unwrap();
    let report = processor
        .run_paths(
            Path::new("/in"),
            Path::new("/out"),
            paths(&["/in/fileA.wav", "/in/fileB.mp3", "/in/fileC.mp3"]),
        )
        .unwrap();

    // Batch decisions
    assert_eq!(report.target_channel_count, Some(2));
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.duplicates[0].kept(), Path::new("/in/fileB.mp3"));
    assert_eq!(report.duplicates[0].skipped(), &[PathBuf::from("/in/fileC.mp3")]);

    // Report in scan order
    let statuses: Vec<_> = report.files.iter().map(|f| f.status.clone()).collect();
    assert_eq!(
        statuses,
        vec![
            FileStatus::Completed,
            FileStatus::Completed,
            FileStatus::SkippedDuplicate {
                kept: PathBuf::from("/in/fileB.mp3")
            },
        ]
    );
    assert!(report.all_succeeded());
    assert!(report.errors.is_empty());

    // fileA: upmixed and raised by 10 dB
    let a = sink.find("/out/fileA.mp3").unwrap();
    assert_eq!(a.channels, 2);
    assert_eq!(a.frames, 10 * MINUTE_FRAMES);
    assert_relative_eq!(a.rms_dbfs, -20.0, epsilon = 1e-9);
    assert_relative_eq!(
        report.file(Path::new("/in/fileA.wav")).unwrap().applied_gain_db.unwrap(),
        10.0,
        epsilon = 1e-9
    );

    // fileB: lowered by 5 dB and split at 119:58
    let part1 = sink.find("/out/fileB_part1.mp3").unwrap();
    let part2 = sink.find("/out/fileB_part2.mp3").unwrap();
    assert_eq!(part1.frames, 71_980);
    assert_eq!(part2.frames, 200 * MINUTE_FRAMES - 71_980);
    assert_eq!(part1.channels, 2);
    assert_relative_eq!(part1.rms_dbfs, -20.0, epsilon = 1e-9);
    assert_relative_eq!(part2.rms_dbfs, -20.0, epsilon = 1e-9);
    assert_eq!(part1.bitrate.kbps(), 192);

    let b_report = report.file(Path::new("/in/fileB.mp3")).unwrap();
    assert_eq!(b_report.outputs.len(), 2);
    assert_eq!(b_report.outputs[0].segment.start_ms, 0);
    assert_eq!(b_report.outputs[0].segment.end_ms, 7_198_000);
    assert_eq!(b_report.outputs[1].segment.start_ms, 7_198_000);
    assert_eq!(b_report.outputs[1].segment.end_ms, 12_000_000);

    // Duplicate never touched the encoder
    assert_eq!(sink.written().len(), 3);
    assert!(sink.written().iter().all(|w| !w.path.to_string_lossy().contains("fileC")));
}

#[test]
fn test_mono_batch_stays_mono() {
    let source = MemorySource::default()
        .with("/in/a.mp3", square(1, 100, -25.0))
        .with("/in/b.mp3", square(1, 50, -18.0));
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(single_threaded(), source, sink.clone()).unwrap();
    let report = processor
        .run_paths(Path::new("/in"), Path::new("/out"), paths(&["/in/a.mp3", "/in/b.mp3"]))
        .unwrap();

    assert_eq!(report.target_channel_count, Some(1));
    assert!(sink.written().iter().all(|w| w.channels == 1));
}

#[test]
fn test_nested_directories_mirrored() {
    let source = MemorySource::default()
        .with("/in/part1/ch01.wav", square(1, 100, -20.0))
        .with("/in/part2/ch01.wav", square(1, 120, -20.0));
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(single_threaded(), source, sink.clone()).unwrap();
    processor
        .run_paths(
            Path::new("/in"),
            Path::new("/out"),
            paths(&["/in/part1/ch01.wav", "/in/part2/ch01.wav"]),
        )
        .unwrap();

    let written: Vec<_> = sink.written().into_iter().map(|w| w.path).collect();
    assert_eq!(
        written,
        paths(&["/out/part1/ch01.mp3", "/out/part2/ch01.mp3"])
    );
}

#[test]
fn test_custom_segment_ceiling() {
    let config = single_threaded()
        .with_max_duration_ms(60_000)
        .with_safety_margin_ms(10_000);
    let source = MemorySource::default().with("/in/long.mp3", square(1, 2 * MINUTE_FRAMES, -20.0));
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(config, source, sink.clone()).unwrap();
    let report = processor
        .run_paths(Path::new("/in"), Path::new("/out"), paths(&["/in/long.mp3"]))
        .unwrap();

    // 120 s in 50 s pieces
    let frames: Vec<_> = sink.written().into_iter().map(|w| w.frames).collect();
    assert_eq!(frames, vec![500, 500, 200]);
    assert_eq!(report.outputs_written(), 3);
}

// ═══════════════════════════════════════════════════════════════════════════════
// WARNINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_silent_and_empty_inputs() {
    let silent = AudioBuffer {
        samples: vec![0.0; 200],
        channels: 1,
        sample_rate: SAMPLE_RATE,
    };
    let source = MemorySource::default()
        .with("/in/empty.wav", AudioBuffer::new(1, SAMPLE_RATE))
        .with("/in/silent.wav", silent);
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(single_threaded(), source, sink.clone()).unwrap();
    let report = processor
        .run_paths(
            Path::new("/in"),
            Path::new("/out"),
            paths(&["/in/empty.wav", "/in/silent.wav"]),
        )
        .unwrap();

    for file in &report.files {
        assert_eq!(file.status, FileStatus::Completed);
        assert_eq!(file.applied_gain_db, Some(0.0));
        assert_eq!(file.warnings, vec![FileWarning::SilentInput]);
        assert_eq!(file.outputs.len(), 1);
    }

    // Zero-length file still yields exactly one output
    assert_eq!(sink.find("/out/empty.mp3").unwrap().frames, 0);
}

#[test]
fn test_clipping_reported() {
    // One loud spike in an otherwise quiet file
    let mut buffer = square(1, 1000, -40.0);
    buffer.samples[10] = 0.9;

    let source = MemorySource::default().with("/in/spiky.wav", buffer);
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(single_threaded(), source, sink).unwrap();
    let report = processor
        .run_paths(Path::new("/in"), Path::new("/out"), paths(&["/in/spiky.wav"]))
        .unwrap();

    let file = &report.files[0];
    assert_eq!(file.status, FileStatus::Completed);
    assert!(matches!(
        file.warnings.as_slice(),
        [FileWarning::Clipped { samples: 1 }]
    ));
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAILURE ISOLATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_undecodable_file_does_not_stop_batch() {
    let source = MemorySource::default()
        .with("/in/a.mp3", square(1, 100, -20.0))
        .with("/in/c.mp3", square(1, 100, -22.0));
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(single_threaded(), source, sink.clone()).unwrap();
    let report = processor
        .run_paths(
            Path::new("/in"),
            Path::new("/out"),
            paths(&["/in/a.mp3", "/in/broken.mp3", "/in/c.mp3"]),
        )
        .unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.files[1].status, FileStatus::Failed);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, PathBuf::from("/in/broken.mp3"));
    assert_eq!(report.errors[0].stage, Stage::Scan);
    assert_eq!(report.errors[0].kind, ErrorKind::DecodeError);
    assert_eq!(sink.written().len(), 2);
}

#[test]
fn test_unsupported_layout_fails_one_file() {
    let source = MemorySource::default()
        .with("/in/narration.wav", square(2, 100, -20.0))
        .with("/in/surround.wav", square(6, 100, -20.0));
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(single_threaded(), source, sink.clone()).unwrap();
    let report = processor
        .run_paths(
            Path::new("/in"),
            Path::new("/out"),
            paths(&["/in/narration.wav", "/in/surround.wav"]),
        )
        .unwrap();

    assert_eq!(report.target_channel_count, Some(2));
    let surround = report.file(Path::new("/in/surround.wav")).unwrap();
    let error = surround.error.as_ref().unwrap();
    assert_eq!(error.stage, Stage::ChannelConversion);
    assert_eq!(error.kind, ErrorKind::ChannelConversionError);
    assert_eq!(surround.source_channels, Some(6));
    assert!(sink.find("/out/narration.mp3").is_some());
    assert!(sink.find("/out/surround.mp3").is_none());
}

#[test]
fn test_encode_failure_keeps_earlier_parts() {
    let config = single_threaded()
        .with_max_duration_ms(60_000)
        .with_safety_margin_ms(0);
    let source = MemorySource::default()
        .with("/in/long.mp3", square(1, 3 * MINUTE_FRAMES, -20.0))
        .with("/in/short.mp3", square(1, 100, -20.0));
    let sink = RecordingSink::failing_on("_part2.mp3");

    let processor = BatchProcessor::new(config, source, sink.clone()).unwrap();
    let report = processor
        .run_paths(
            Path::new("/in"),
            Path::new("/out"),
            paths(&["/in/long.mp3", "/in/short.mp3"]),
        )
        .unwrap();

    let long = report.file(Path::new("/in/long.mp3")).unwrap();
    assert!(long.is_failed());
    assert_eq!(long.error.as_ref().unwrap().stage, Stage::Encode);
    // part1 written, part3 never attempted
    assert_eq!(long.outputs.len(), 1);
    assert!(sink.find("/out/long_part3.mp3").is_none());

    let short = report.file(Path::new("/in/short.mp3")).unwrap();
    assert_eq!(short.status, FileStatus::Completed);
    assert!(!report.all_succeeded());
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH-LEVEL ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_output_collision_rejected_before_writing() {
    let source = MemorySource::default()
        .with("/in/book.mp3", square(1, 100, -20.0))
        .with("/in/book.wav", square(1, 120, -21.0));
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(single_threaded(), source, sink.clone()).unwrap();
    let err = processor
        .run_paths(
            Path::new("/in"),
            Path::new("/out"),
            paths(&["/in/book.mp3", "/in/book.wav"]),
        )
        .unwrap_err();

    assert!(matches!(err, DeliveryError::PolicyViolation(_)));
    assert!(err.is_fatal());
    assert!(sink.written().is_empty());
}

#[test]
fn test_empty_batch_rejected() {
    let processor =
        BatchProcessor::new(single_threaded(), MemorySource::default(), RecordingSink::default())
            .unwrap();
    let err = processor
        .run_paths(Path::new("/in"), Path::new("/out"), Vec::new())
        .unwrap_err();
    assert!(matches!(err, DeliveryError::PolicyViolation(_)));
}

#[test]
fn test_invalid_config_rejected() {
    let config = DeliveryConfig::default()
        .with_max_duration_ms(1_000)
        .with_safety_margin_ms(1_000);
    let result = BatchProcessor::new(config, MemorySource::default(), RecordingSink::default());
    assert!(matches!(result, Err(DeliveryError::InvalidConfig(_))));
}

#[test]
fn test_dry_run_plan_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join("a.mp3"), b"x").unwrap();
    std::fs::write(root.join("b.mp3"), b"x").unwrap();

    let a = root.join("a.mp3");
    let b = root.join("b.mp3");
    let source = MemorySource::default()
        .with(a.to_str().unwrap(), square(1, 100, -20.0))
        .with(b.to_str().unwrap(), square(1, 100, -20.0));
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(single_threaded(), source, sink.clone()).unwrap();
    let plan = processor.plan(root).unwrap();

    assert_eq!(plan.survivors().len(), 1);
    assert_eq!(plan.exports.output_count(), 1);
    let text = plan.describe();
    assert!(text.contains("keep"));
    assert!(text.contains("a.mp3"));
    assert!(sink.written().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// CANCELLATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_cancel_before_run() {
    let source = MemorySource::default().with("/in/a.mp3", square(1, 100, -20.0));
    let processor =
        BatchProcessor::new(single_threaded(), source, RecordingSink::default()).unwrap();

    processor.cancel();
    assert!(processor.is_cancelled());

    let err = processor
        .run_paths(Path::new("/in"), Path::new("/out"), paths(&["/in/a.mp3"]))
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Cancelled));
}

#[test]
fn test_cancel_mid_batch_lets_running_file_finish() {
    let flag = Arc::new(AtomicBool::new(false));
    let mut source = MemorySource::default()
        .with("/in/a.mp3", square(1, 100, -20.0))
        .with("/in/b.mp3", square(1, 110, -20.0))
        .with("/in/c.mp3", square(1, 120, -20.0));
    // Fires while "a" is being transformed
    source.cancel = Some((PathBuf::from("/in/a.mp3"), flag.clone()));
    let sink = RecordingSink::default();

    let processor = BatchProcessor::new(single_threaded(), source, sink.clone())
        .unwrap()
        .with_cancel_flag(flag);

    let report = processor
        .run_paths(
            Path::new("/in"),
            Path::new("/out"),
            paths(&["/in/a.mp3", "/in/b.mp3", "/in/c.mp3"]),
        )
        .unwrap();

    assert_eq!(report.files[0].status, FileStatus::Completed);
    assert_eq!(report.files[1].status, FileStatus::Cancelled);
    assert_eq!(report.files[2].status, FileStatus::Cancelled);
    assert_eq!(report.cancelled, 2);
    assert!(!report.all_succeeded());
    assert_eq!(sink.written().len(), 1);
}
