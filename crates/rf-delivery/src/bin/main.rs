//! rf-deliver: conform a folder of narration files for audiobook delivery
//!
//! Usage:
//!   rf-deliver -i raw/ -o acx/                  - process everything
//!   rf-deliver -i raw/ -o acx/ --dry-run        - show duplicates and planned outputs
//!   rf-deliver -i raw/ -o acx/ --report r.json --json

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use rf_delivery::{BatchProcessor, CbrBitrate, DeliveryConfig, ReportFormat};

#[derive(Parser)]
#[command(name = "rf-deliver", version, about = "Batch audiobook delivery conformance")]
struct Cli {
    /// Input directory (scanned recursively)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory (mirrors the input structure)
    #[arg(short, long)]
    output: PathBuf,

    /// JSON configuration file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target mean power in dBFS
    #[arg(long, allow_negative_numbers = true)]
    target_dbfs: Option<f64>,

    /// Maximum output duration in minutes
    #[arg(long)]
    max_minutes: Option<u64>,

    /// Safety margin below the maximum, in seconds
    #[arg(long)]
    margin_secs: Option<u64>,

    /// Constant output bitrate (e.g. 192k)
    #[arg(long)]
    bitrate: Option<CbrBitrate>,

    /// Input extension to accept (repeatable)
    #[arg(long = "ext")]
    extensions: Vec<String>,

    /// Worker threads (0 = one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Write the report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Render the report as JSON
    #[arg(long)]
    json: bool,

    /// Plan only; write nothing
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn delivery_config(&self) -> Result<DeliveryConfig> {
        let mut config = match &self.config {
            Some(path) => DeliveryConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => DeliveryConfig::default(),
        };

        if let Some(dbfs) = self.target_dbfs {
            config = config.with_target_loudness(dbfs);
        }
        if let Some(minutes) = self.max_minutes {
            config = config.with_max_duration_ms(minutes.saturating_mul(60_000));
        }
        if let Some(secs) = self.margin_secs {
            config = config.with_safety_margin_ms(secs.saturating_mul(1000));
        }
        if let Some(bitrate) = self.bitrate {
            config = config.with_bitrate(bitrate);
        }
        if !self.extensions.is_empty() {
            config = config.with_extensions(self.extensions.iter().cloned());
        }
        if let Some(threads) = self.threads {
            config = config.with_threads(threads);
        }

        Ok(config)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let config = cli.delivery_config()?;
    let processor = BatchProcessor::with_defaults(config)?;

    log::info!(
        "rf-deliver {}: {} -> {}",
        rf_delivery::VERSION,
        cli.input.display(),
        cli.output.display()
    );

    if cli.dry_run {
        let plan = processor
            .plan(&cli.input)
            .with_context(|| format!("planning {}", cli.input.display()))?;
        print!("{}", plan.describe());
        return Ok(true);
    }

    let report = processor
        .run(&cli.input, &cli.output)
        .with_context(|| format!("processing {}", cli.input.display()))?;

    let format = if cli.json { ReportFormat::Json } else { ReportFormat::Text };
    println!("{}", report.generate(format));

    if let Some(path) = &cli.report {
        report
            .save(path, format)
            .with_context(|| format!("writing report {}", path.display()))?;
        log::info!("Report saved to {}", path.display());
    }

    Ok(report.all_succeeded())
}
