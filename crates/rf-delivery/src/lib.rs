//! RF-Delivery: Batch Audiobook Delivery Conformance
//!
//! Turns a directory tree of narration files into a delivery-ready tree:
//! - Duplicate detection by decoded-content digest
//! - One channel layout for the whole batch
//! - Mean-power normalization to a target dBFS
//! - Splitting of over-long files under a maximum duration
//! - Constant-bitrate MP3 output mirroring the input structure
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        BatchProcessor                             │
//! │                                                                   │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌────────────┐ │
//! │  │  Scan    │ → │  Dedup   │ → │ Channel      │ → │ ExportPlan │ │
//! │  │ (digest) │   │ (digest) │   │ Policy       │   │ (names)    │ │
//! │  └──────────┘   └──────────┘   └──────────────┘   └────────────┘ │
//! │                                                                   │
//! │  ┌──────────────────────────────────────────────────────────────┐│
//! │  │              Per-file workers (rayon)                        ││
//! │  │  Decode → Channels → Normalize → Segment → Encode            ││
//! │  └──────────────────────────────────────────────────────────────┘│
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rf_delivery::{BatchProcessor, DeliveryConfig, ReportFormat};
//!
//! let config = DeliveryConfig::default().with_target_loudness(-20.0);
//! let processor = BatchProcessor::with_defaults(config)?;
//!
//! let report = processor.run("/books/raw".as_ref(), "/books/acx".as_ref())?;
//! println!("{}", report.generate(ReportFormat::Text));
//! ```

mod channels;
mod config;
mod decoder;
mod dedup;
mod encoder;
mod error;
mod hash;
mod job;
mod naming;
mod normalize;
mod pipeline;
mod report;
mod scan;
mod segment;

pub use channels::*;
pub use config::*;
pub use decoder::*;
pub use dedup::*;
pub use encoder::*;
pub use error::*;
pub use hash::*;
pub use job::*;
pub use naming::*;
pub use normalize::*;
pub use pipeline::*;
pub use report::*;
pub use scan::*;
pub use segment::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
