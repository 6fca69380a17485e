use super::types::*;
use crate::error::{ExtractError, Result};
use crate::utils::Structure;

/// Largest adaptation_field_length that still leaves room for a payload byte.
const MAX_ADAPTATION_FIELD_WITH_PAYLOAD: u8 = 182;
/// Largest adaptation_field_length of an adaptation-only packet.
const MAX_ADAPTATION_FIELD: u8 = 183;

/// Decodes transport packet headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TSPacketParser;

impl TSPacketParser {
    pub fn new() -> Self {
        Self
    }

    /// Decodes the header of a full 188-byte packet, including the
    /// adaptation field length when `adaptation_field_control` has its high
    /// bit set.
    ///
    /// The adaptation field length is recorded as found. Call
    /// [`check_adaptation_field`](Self::check_adaptation_field) before using
    /// the payload of a packet.
    pub fn parse_header(&self, data: &[u8]) -> Result<TSHeader> {
        if data.len() < TS_PACKET_SIZE {
            return Err(Structure::Packet.malformed(format!(
                "packet is {} bytes, expected {}",
                data.len(),
                TS_PACKET_SIZE
            )));
        }

        if data[0] != SYNC_BYTE {
            return Err(ExtractError::MalformedPacket(format!(
                "invalid sync byte {:#04x}",
                data[0]
            )));
        }

        let mut header = TSHeader {
            sync_byte: data[0],
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_control: (data[3] >> 4) & 0x03,
            continuity_counter: data[3] & 0x0F,
            adaptation_field_length: None,
        };

        if header.has_adaptation_field() {
            header.adaptation_field_length = Some(data[TS_HEADER_SIZE]);
        }

        Ok(header)
    }

    /// Fails with `MalformedPacket` when the adaptation field runs past the
    /// end of the packet.
    pub fn check_adaptation_field(&self, header: &TSHeader) -> Result<()> {
        let Some(length) = header.adaptation_field_length else {
            return Ok(());
        };
        let limit = if header.has_payload() {
            MAX_ADAPTATION_FIELD_WITH_PAYLOAD
        } else {
            MAX_ADAPTATION_FIELD
        };
        if length > limit {
            return Err(ExtractError::MalformedPacket(format!(
                "adaptation field length {} exceeds {} on PID {:#06x}",
                length, limit, header.pid
            )));
        }
        Ok(())
    }

    /// The payload bytes of a packet, from the shared payload offset to the
    /// end of the packet. Empty when the packet carries no payload.
    pub fn payload<'a>(&self, header: &TSHeader, data: &'a [u8]) -> &'a [u8] {
        if !header.has_payload() {
            return &[];
        }
        let offset = header.payload_offset().min(TS_PACKET_SIZE);
        &data[offset..TS_PACKET_SIZE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    fn packet(b1: u8, b2: u8, b3: u8) -> [u8; TS_PACKET_SIZE] {
        let mut data = [0xFFu8; TS_PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[1] = b1;
        data[2] = b2;
        data[3] = b3;
        data
    }

    #[test]
    fn test_parse_ts_header() {
        let parser = TSPacketParser::new();
        let data = packet(0x40, 0x00, 0x10);

        let header = parser.parse_header(&data).unwrap();
        assert_eq!(header.sync_byte, 0x47);
        assert!(header.payload_unit_start);
        assert!(!header.transport_error);
        assert_eq!(header.pid, 0);
        assert_eq!(header.adaptation_field_control, 0b01);
        assert_eq!(header.adaptation_field_length, None);
        assert_eq!(header.payload_offset(), 4);
        assert_eq!(parser.payload(&header, &data).len(), 184);
    }

    #[test]
    fn test_adaptation_field_moves_payload() {
        let parser = TSPacketParser::new();
        let mut data = packet(0x01, 0x31, 0x30 | 0x07);
        data[4] = 10;
        data[15] = 0xAB;

        let header = parser.parse_header(&data).unwrap();
        assert_eq!(header.pid, 0x0131);
        assert_eq!(header.continuity_counter, 7);
        assert_eq!(header.adaptation_field_length, Some(10));
        assert_eq!(header.payload_offset(), 15);

        let payload = parser.payload(&header, &data);
        assert_eq!(payload.len(), 188 - 15);
        assert_eq!(payload[0], 0xAB);
    }

    #[test]
    fn test_adaptation_only_packet_has_no_payload() {
        let parser = TSPacketParser::new();
        let mut data = packet(0x01, 0x31, 0x20);
        data[4] = 183;

        let header = parser.parse_header(&data).unwrap();
        assert!(!header.has_payload());
        assert!(parser.payload(&header, &data).is_empty());
    }

    #[test]
    fn test_oversized_adaptation_field() {
        let parser = TSPacketParser::new();
        let mut data = packet(0x01, 0x31, 0x30);
        data[4] = 183;

        // Decoding succeeds; the length is only rejected when checked
        let header = parser.parse_header(&data).unwrap();
        assert_eq!(header.adaptation_field_length, Some(183));
        assert!(parser.payload(&header, &data).is_empty());
        assert!(matches!(
            parser.check_adaptation_field(&header),
            Err(ExtractError::MalformedPacket(_))
        ));

        data[3] = 0x20;
        let header = parser.parse_header(&data).unwrap();
        assert!(parser.check_adaptation_field(&header).is_ok());
        data[4] = 184;
        let header = parser.parse_header(&data).unwrap();
        assert!(matches!(
            parser.check_adaptation_field(&header),
            Err(ExtractError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_rejects_short_or_unsynced_packets() {
        let parser = TSPacketParser::new();
        let data = packet(0x00, 0x00, 0x10);
        assert!(parser.parse_header(&data[..100]).is_err());

        let mut data = data;
        data[0] = 0x48;
        assert!(parser.parse_header(&data).is_err());
    }

    #[quickcheck]
    fn prop_pid_is_13_bits(b1: u8, b2: u8) -> bool {
        let parser = TSPacketParser::new();
        let header = parser.parse_header(&packet(b1, b2, 0x10)).unwrap();
        header.pid <= PID_MAX
            && header.pid == (((b1 & 0x1F) as u16) << 8 | b2 as u16)
            && header.payload_unit_start == (b1 & 0x40 != 0)
    }
}
