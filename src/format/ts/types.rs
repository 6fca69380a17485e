use crate::error::Result;
use bytes::{BufMut, BytesMut};
use std::fmt;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1FFF;
pub const PID_MAX: u16 = 0x1FFF;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary Stream Types
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
pub const STREAM_TYPE_AAC: u8 = 0x0f;
pub const STREAM_TYPE_AAC_LATM: u8 = 0x11;

// Stream IDs
pub const STREAM_ID_AUDIO: u8 = 0xc0;

// Constants
pub const SYNC_BYTE: u8 = 0x47;
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];
/// Bytes of a PES header before the optional fields: start code, stream id,
/// packet length, two flag bytes and PES_header_data_length.
pub const PES_FIXED_HEADER_SIZE: usize = 9;

/// Codec label of the extracted elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFormat {
    AAC,
    MP3,
    #[default]
    Unknown,
}

impl StreamFormat {
    /// Classifies a PMT stream_type. Anything but AAC or MPEG audio is `None`.
    pub fn from_stream_type(stream_type: u8) -> Option<Self> {
        match stream_type {
            STREAM_TYPE_AAC | STREAM_TYPE_AAC_LATM => Some(StreamFormat::AAC),
            STREAM_TYPE_MPEG2_AUDIO => Some(StreamFormat::MP3),
            _ => None,
        }
    }

    /// File extension for the extracted stream, if the format is known.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            StreamFormat::AAC => Some("aac"),
            StreamFormat::MP3 => Some("mp3"),
            StreamFormat::Unknown => None,
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFormat::AAC => write!(f, "AAC"),
            StreamFormat::MP3 => write!(f, "MP3"),
            StreamFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// The four fixed bytes at the start of every transport packet, plus the
/// adaptation field length when one is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TSHeader {
    pub sync_byte: u8, // Always 0x47
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    /// Two bits: `0b10` adaptation field present, `0b01` payload present.
    pub adaptation_field_control: u8,
    pub continuity_counter: u8,
    /// First byte of the adaptation field, when `adaptation_field_control` says
    /// there is one.
    pub adaptation_field_length: Option<u8>,
}

impl Default for TSHeader {
    fn default() -> Self {
        Self {
            sync_byte: SYNC_BYTE,
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: 0,
            scrambling_control: 0,
            adaptation_field_control: 0b01,
            continuity_counter: 0,
            adaptation_field_length: None,
        }
    }
}

impl TSHeader {
    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control & 0b10 != 0
    }

    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0b01 != 0
    }

    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control != 0
    }

    /// Offset of the first payload byte within the 188-byte packet.
    ///
    /// 4 without an adaptation field, `5 + adaptation_field_length` with one.
    /// This is the single place that accounts for the adaptation field; PAT,
    /// PMT and PES consumers all start from it.
    pub fn payload_offset(&self) -> usize {
        match self.adaptation_field_length {
            Some(length) if self.has_adaptation_field() => TS_HEADER_SIZE + 1 + length as usize,
            _ => TS_HEADER_SIZE,
        }
    }

    /// Encodes the four fixed header bytes followed, if set, by the adaptation
    /// field length byte.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.sync_byte);

        let mut b1 = 0u8;
        if self.transport_error {
            b1 |= 0x80;
        }
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        if self.transport_priority {
            b1 |= 0x20;
        }
        b1 |= ((self.pid >> 8) & 0x1f) as u8;
        buf.put_u8(b1);

        buf.put_u8((self.pid & 0xff) as u8);

        let b3 = (self.scrambling_control & 0x03) << 6
            | (self.adaptation_field_control & 0x03) << 4
            | self.continuity_counter & 0x0f;
        buf.put_u8(b3);

        if let Some(length) = self.adaptation_field_length {
            if self.has_adaptation_field() {
                buf.put_u8(length);
            }
        }

        Ok(())
    }
}

/// A raw 188-byte transport packet as read from the input.
#[derive(Clone, PartialEq, Eq)]
pub struct TSPacket {
    data: [u8; TS_PACKET_SIZE],
}

impl TSPacket {
    pub fn new(data: [u8; TS_PACKET_SIZE]) -> Self {
        Self { data }
    }

    /// Copies a packet out of a slice of exactly 188 bytes.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let data: [u8; TS_PACKET_SIZE] = data.try_into().ok()?;
        Some(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pid(&self) -> u16 {
        ((self.data[1] as u16 & 0x1F) << 8) | self.data[2] as u16
    }
}

impl fmt::Debug for TSPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TSPacket")
            .field("pid", &format_args!("{:#06x}", self.pid()))
            .field("header", &format_args!("{:02x?}", &self.data[..TS_HEADER_SIZE]))
            .finish()
    }
}

/// One program -> PMT PID association from a PAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PATEntry {
    pub program_number: u16,
    pub program_map_pid: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PAT {
    pub transport_stream_id: u16,
    pub entries: Vec<PATEntry>,
}

/// One elementary stream entry of a PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub es_info_length: usize,
}

impl ElementaryStreamInfo {
    /// The audio format this entry carries, if it is one we extract.
    pub fn audio_format(&self) -> Option<StreamFormat> {
        StreamFormat::from_stream_type(self.stream_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PMT {
    pub program_number: u16,
    pub pcr_pid: u16,
    pub program_info_length: usize,
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}
