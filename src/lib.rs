#![doc(html_root_url = "https://docs.rs/tsaudio/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsaudio - MPEG-TS audio extraction
//!
//! `tsaudio` reads an MPEG-2 transport stream and writes out the raw bytes of
//! its AAC or MP3 elementary stream, with the transport and PES framing
//! removed. The output is the ADTS or MP3 frame sequence exactly as it was
//! carried in the stream.
//!
//! ## Features
//!
//! - Byte-level resynchronization on the 0x47 sync byte
//! - PAT and PMT discovery of AAC (stream types 0x0F, 0x11) and MP3 (0x04)
//! - Adaptation field aware payload extraction
//! - Optional CRC_32 verification of PSI sections
//! - Bounded PID tables and bounds-checked parsing throughout
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tsaudio = "0.1.0"
//! ```
//!
//! ### Extracting a file
//!
//! ```rust,no_run
//! use tsaudio::{extract_file, DemuxConfig, ExtractError};
//!
//! fn main() -> Result<(), ExtractError> {
//!     let config = DemuxConfig::load()?;
//!     let summary = extract_file("input.ts", "input.audio", &config)?;
//!
//!     match summary.format.extension() {
//!         Some(ext) => println!("{} bytes of .{} audio", summary.bytes_written, ext),
//!         None => return Err(ExtractError::NoAudioStream),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Extracting from any reader
//!
//! ```rust
//! use tsaudio::{extract, DemuxConfig, StreamFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // A single null packet and no PAT: nothing is extracted
//! let mut input = vec![0xFFu8; 188];
//! input[..4].copy_from_slice(&[0x47, 0x1F, 0xFF, 0x10]);
//! let mut output = Vec::new();
//!
//! let summary = extract(&input[..], &mut output, &DemuxConfig::default())?;
//! assert_eq!(summary.packets, 1);
//! assert_eq!(summary.format, StreamFormat::Unknown);
//! assert!(output.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `format::ts`: the transport stream pipeline
//!   - Packet synchronizer and header parser
//!   - PAT/PMT parsing into bounded PID tables
//!   - PES header stripping
//!   - The demux state machine and a stream synthesizer
//!
//! - `config`: run settings loaded from defaults, a config file and the
//!   environment
//!
//! - `error`: the `ExtractError` type and `Result` alias
//!
//! - `utils`: byte cursor and CRC-32/MPEG-2
//!
//! ## Logging
//!
//! Diagnostics go through the `log` facade. Install any logger to see them;
//! per-packet detail is emitted at `trace` level when
//! [`DemuxConfig::trace_packets`] is set.

/// Error types and utilities
pub mod error;

/// Media format implementations
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use config::DemuxConfig;
pub use error::{ExtractError, Result};
pub use format::ts::{extract, extract_file, ExtractSummary, StreamFormat, TSAudioDemuxer};
