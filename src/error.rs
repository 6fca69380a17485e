use std::io;
use thiserror::Error;

/// Every way an extraction run can fail.
///
/// All variants are terminal for the run; nothing is retried.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Reading or opening the transport stream failed.
    #[error("input error: {0}")]
    Input(#[source] io::Error),

    /// Opening, writing, flushing or syncing the elementary stream sink failed.
    #[error("output error: {0}")]
    Output(#[source] io::Error),

    /// A sync byte was found but fewer than 188 bytes followed it.
    #[error("truncated packet at offset {offset}: only {available} of 188 bytes available")]
    TruncatedPacket {
        /// Stream offset of the sync byte.
        offset: u64,
        /// Bytes that could be read, sync byte included.
        available: usize,
    },

    /// A PAT or PMT section points outside the packet that carries it.
    #[error("malformed {table} section: {reason}")]
    MalformedTable {
        /// `"PAT"` or `"PMT"`.
        table: &'static str,
        /// What was out of bounds.
        reason: String,
    },

    /// A PES header claims more bytes than its packet holds.
    #[error("malformed PES header: {0}")]
    MalformedPes(String),

    /// The transport packet header itself is inconsistent.
    #[error("malformed transport packet: {0}")]
    MalformedPacket(String),

    /// Section CRC did not match (only checked when enabled).
    #[error("{table} CRC mismatch: section carries {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// `"PAT"` or `"PMT"`.
        table: &'static str,
        /// CRC stored in the section.
        expected: u32,
        /// CRC computed over the section.
        computed: u32,
    },

    /// A PID table would grow past its configured capacity.
    #[error("too many PIDs in {table} table (capacity {capacity})")]
    TooManyPids {
        /// Which table overflowed.
        table: &'static str,
        /// The configured capacity.
        capacity: usize,
    },

    /// A PID outside the 13-bit range.
    #[error("invalid PID {0:#06x}")]
    InvalidPid(u16),

    /// The stream ended without any AAC or MP3 elementary stream being found.
    #[error("no AAC or MP3 audio stream found")]
    NoAudioStream,

    /// A configuration value could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// I/O outside the extraction pipeline (config files, templates).
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
