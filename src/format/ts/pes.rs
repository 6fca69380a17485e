use super::types::*;
use crate::error::{ExtractError, Result};
use crate::utils::{ByteCursor, Structure};
use bytes::{BufMut, BytesMut};
use std::io::Write;

/// The fixed part of a PES header, plus the PTS when flagged.
///
/// Only the fields needed to find where the elementary stream data begins
/// are decoded; `packet_length` and `pts` are informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PESHeader {
    /// Stream identifier indicating content type (audio streams are 0xC0-0xDF)
    pub stream_id: u8,
    /// Bytes following the packet length field, 0 when unbounded
    pub packet_length: u16,
    /// Flags indicating presence of PTS/DTS fields
    pub pts_dts_flags: u8,
    /// Length of the optional fields and stuffing after this byte
    pub header_data_length: u8,
    /// Presentation Time Stamp (33 bits)
    pub pts: Option<u64>,
}

impl PESHeader {
    /// Creates an audio PES header with no optional fields.
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            packet_length: 0,
            pts_dts_flags: 0,
            header_data_length: 0,
            pts: None,
        }
    }

    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts & 0x1_FFFF_FFFF);
        self.pts_dts_flags = 0x80;
        self.header_data_length = self.header_data_length.max(5);
        self
    }

    /// Sets PES_header_data_length; bytes beyond the PTS are written as
    /// 0xFF stuffing.
    pub fn with_header_data_length(mut self, length: u8) -> Self {
        self.header_data_length = length;
        self
    }

    /// Offset of the first elementary stream byte from the start code.
    pub fn data_offset(&self) -> usize {
        PES_FIXED_HEADER_SIZE + self.header_data_length as usize
    }

    /// Decodes a PES header at the start of `payload`.
    ///
    /// Returns `None` when the payload does not begin with the 0x000001
    /// start code, i.e. it continues a PES packet begun earlier.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>> {
        if payload.len() < PES_START_CODE.len() || payload[..3] != PES_START_CODE {
            return Ok(None);
        }

        let mut cursor = ByteCursor::new(payload, Structure::Pes);
        cursor.skip(PES_START_CODE.len())?;
        let stream_id = cursor.read_u8()?;
        let packet_length = cursor.read_u16()?;
        cursor.skip(1)?;
        let pts_dts_flags = cursor.read_u8()? & 0xC0;
        let header_data_length = cursor.read_u8()?;

        let mut header = PESHeader {
            stream_id,
            packet_length,
            pts_dts_flags,
            header_data_length,
            pts: None,
        };

        if header.data_offset() > payload.len() {
            return Err(ExtractError::MalformedPes(format!(
                "PES_header_data_length {} puts the data at offset {}, past the {} byte payload",
                header_data_length,
                header.data_offset(),
                payload.len()
            )));
        }

        if pts_dts_flags & 0x80 != 0 && header_data_length >= 5 {
            header.pts = Some(parse_timestamp(cursor.read_slice(5)?));
        }

        Ok(Some(header))
    }

    /// Writes the PES header to a BytesMut buffer.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&PES_START_CODE);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);

        // '10' marker, no scrambling, data_alignment set
        buf.put_u8(0x84);
        buf.put_u8(self.pts_dts_flags);
        buf.put_u8(self.header_data_length);

        let mut written = 0;
        if let Some(pts) = self.pts {
            write_timestamp(buf, 0x20, pts)?;
            written = 5;
        }
        for _ in written..self.header_data_length as usize {
            buf.put_u8(0xFF);
        }

        Ok(())
    }
}

/// Decodes a 33-bit PTS/DTS spread over 5 bytes with marker bits.
fn parse_timestamp(data: &[u8]) -> u64 {
    ((data[0] as u64 & 0x0E) << 29)
        | ((data[1] as u64) << 22)
        | ((data[2] as u64 & 0xFE) << 14)
        | ((data[3] as u64) << 7)
        | ((data[4] as u64 & 0xFE) >> 1)
}

/// Helper function to write PTS/DTS timestamps to a buffer.
fn write_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) -> Result<()> {
    let pts = ts & 0x1FFFFFFFF; // 33 bits

    // First byte: marker bits and 3 MSB of timestamp
    buf.put_u8(marker | ((pts >> 29) & 0x0E) as u8 | 0x01);

    // Middle 16 bits and marker
    buf.put_u16((((pts >> 14) & 0xFFFE) | 0x01) as u16);

    // Final 15 bits and marker
    buf.put_u16((((pts << 1) & 0xFFFE) | 0x01) as u16);

    Ok(())
}

/// Strips PES headers from audio packets and forwards the rest to a sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct PESExtractor;

impl PESExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Splits an audio packet's payload into its PES header, if it starts a
    /// PES packet, and the elementary stream bytes that follow.
    ///
    /// With a start code the data runs from `9 + PES_header_data_length` to
    /// the end of the packet; without one the whole payload is data.
    pub fn split<'a>(&self, payload: &'a [u8]) -> Result<(Option<PESHeader>, &'a [u8])> {
        match PESHeader::parse(payload)? {
            Some(header) => {
                let data = &payload[header.data_offset()..];
                Ok((Some(header), data))
            }
            None => Ok((None, payload)),
        }
    }

    /// Writes the elementary stream bytes of one packet to `sink` and
    /// returns how many were written.
    ///
    /// The payload is fully validated before anything is written.
    pub fn extract<W: Write>(&self, payload: &[u8], sink: &mut W) -> Result<(Option<PESHeader>, usize)> {
        let (header, data) = self.split(payload)?;
        sink.write_all(data).map_err(ExtractError::Output)?;
        Ok((header, data.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_header_packet_skips_pes_header() {
        let mut payload = BytesMut::new();
        PESHeader::new(STREAM_ID_AUDIO)
            .with_header_data_length(2)
            .write_to(&mut payload)
            .unwrap();
        assert_eq!(payload.len(), 11);
        payload.put_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);

        let mut sink = Vec::new();
        let (header, written) = PESExtractor::new().extract(&payload, &mut sink).unwrap();

        let header = header.unwrap();
        assert_eq!(header.stream_id, 0xC0);
        assert_eq!(header.data_offset(), 11);
        assert_eq!(written, 10);
        assert_eq!(sink, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_pts_is_decoded() {
        let mut payload = BytesMut::new();
        PESHeader::new(STREAM_ID_AUDIO)
            .with_pts(0x1_2345_6789)
            .write_to(&mut payload)
            .unwrap();
        payload.put_slice(&[0xFF, 0xF1]);

        let header = PESHeader::parse(&payload).unwrap().unwrap();
        assert_eq!(header.pts, Some(0x1_2345_6789));
        assert_eq!(header.header_data_length, 5);
        assert_eq!(&payload[header.data_offset()..], &[0xFF, 0xF1]);
    }

    #[test]
    fn test_continuation_is_copied_verbatim() {
        let payload: Vec<u8> = (0..184).map(|i| i as u8 | 0x80).collect();
        let mut sink = Vec::new();

        let (header, written) = PESExtractor::new().extract(&payload, &mut sink).unwrap();
        assert!(header.is_none());
        assert_eq!(written, 184);
        assert_eq!(sink, payload);
    }

    #[test]
    fn test_header_data_length_past_packet() {
        let mut payload = vec![0x00, 0x00, 0x01, 0xC0, 0x00, 0x00, 0x80, 0x80, 0x20];
        payload.extend_from_slice(&[0u8; 16]);
        let mut sink = Vec::new();

        assert!(matches!(
            PESExtractor::new().extract(&payload, &mut sink),
            Err(ExtractError::MalformedPes(_))
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_start_code_without_full_header() {
        let payload = [0x00, 0x00, 0x01, 0xC0, 0x00];
        assert!(matches!(
            PESHeader::parse(&payload),
            Err(ExtractError::MalformedPes(_))
        ));
    }

    #[quickcheck]
    fn prop_payload_without_start_code_is_copied(payload: Vec<u8>) -> bool {
        if payload.len() >= 3 && payload[..3] == PES_START_CODE {
            return true;
        }
        let mut sink = Vec::new();
        match PESExtractor::new().extract(&payload, &mut sink) {
            Ok((None, written)) => written == payload.len() && sink == payload,
            _ => false,
        }
    }
}
