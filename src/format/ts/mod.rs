//! # MPEG Transport Stream (TS) Audio Extraction
//!
//! This module pulls a single AAC or MP3 elementary stream out of an MPEG-TS
//! byte stream. The pipeline is:
//!
//! - **Packet synchronization**: align on 0x47 sync bytes, 188 bytes at a time
//! - **Header parsing**: PID, payload_unit_start and adaptation field
//! - **PSI tables**: the PAT yields PMT PIDs, PMTs yield audio PIDs
//! - **PES extraction**: strip PES headers and write the raw audio bytes
//!
//! ## Example Usage
//!
//! ### Extracting audio from a synthesized stream
//!
//! ```rust
//! use tsaudio::format::ts::{TSAudioDemuxer, TSPacketWriter, StreamFormat, STREAM_ID_AUDIO, STREAM_TYPE_AAC};
//! use tsaudio::DemuxConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = TSPacketWriter::new(Vec::new());
//! writer.write_pat(1, 0x1000)?;
//! writer.write_pmt(0x1000, 1, &[(STREAM_TYPE_AAC, 0x101)])?;
//! writer.write_pes(0x101, STREAM_ID_AUDIO, &[0xFF, 0xF1, 0x50, 0x80])?;
//! let stream = writer.into_inner();
//!
//! let mut demuxer = TSAudioDemuxer::new(DemuxConfig::default());
//! let mut audio = Vec::new();
//! let summary = demuxer.run(&stream[..], &mut audio)?;
//!
//! assert_eq!(summary.format, StreamFormat::AAC);
//! assert_eq!(audio, vec![0xFF, 0xF1, 0x50, 0x80]);
//! # Ok(())
//! # }
//! ```

/// Demux orchestrator and the file-level entry points
pub mod demuxer;

/// Transport stream synthesizer
pub mod muxer;

/// TS packet header parsing
pub mod parser;

/// PES header parsing and payload extraction
pub mod pes;

/// Bounded PID sets
pub mod pid_table;

/// PAT and PMT section parsing
pub mod psi;

/// Packet synchronizer
pub mod reader;

/// Core TS types and constants
pub mod types;

pub use demuxer::{extract, extract_file, DemuxState, ExtractSummary, PacketAction, TSAudioDemuxer};
pub use muxer::TSPacketWriter;
pub use parser::TSPacketParser;
pub use pes::{PESExtractor, PESHeader};
pub use pid_table::PidTable;
pub use psi::PsiParser;
pub use reader::TSPacketReader;
pub use types::{
    StreamFormat,
    TSHeader,
    TSPacket,
    PID_PAT,
    STREAM_ID_AUDIO,
    STREAM_TYPE_AAC,
    STREAM_TYPE_AAC_LATM,
    STREAM_TYPE_MPEG2_AUDIO,
    TS_PACKET_SIZE,
};
