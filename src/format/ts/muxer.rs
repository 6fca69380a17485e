use super::pes::PESHeader;
use super::types::*;
use crate::error::{ExtractError, Result};
use crate::utils::crc::Crc32Mpeg2;
use bytes::{BufMut, BytesMut};
use std::collections::HashMap;
use std::io::Write;

const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
/// Largest section that fits in one packet after the pointer_field.
const MAX_SECTION_SIZE: usize = TS_PAYLOAD_SIZE - 1;

/// Writes a minimal single-program transport stream.
///
/// Each call emits whole 188-byte packets: PAT and PMT sections go in a
/// single packet padded with 0xFF, PES packets are split over as many
/// packets as needed with adaptation field stuffing in the last one.
/// Continuity counters are tracked per PID.
pub struct TSPacketWriter<W: Write> {
    writer: W,
    continuity_counters: HashMap<u16, u8>,
    crc: Crc32Mpeg2,
    packets_written: u64,
}

impl<W: Write> TSPacketWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            continuity_counters: HashMap::new(),
            crc: Crc32Mpeg2::new(),
            packets_written: 0,
        }
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(ExtractError::Output)
    }

    fn next_continuity_counter(&mut self, pid: u16) -> u8 {
        let counter = self.continuity_counters.entry(pid).or_insert(0);
        let current = *counter;
        *counter = (*counter + 1) & 0x0F;
        current
    }

    /// Writes a PAT announcing one program.
    pub fn write_pat(&mut self, program_number: u16, pmt_pid: u16) -> Result<()> {
        let mut section = BytesMut::with_capacity(16);
        section.put_u8(TABLE_ID_PAT);
        // 5 header bytes, one entry, CRC
        section.put_u16(0xB000 | (5 + 4 + 4));
        section.put_u16(1); // transport_stream_id
        section.put_u8(0xC1); // version 0, current
        section.put_u8(0);
        section.put_u8(0);
        section.put_u16(program_number);
        section.put_u16(0xE000 | (pmt_pid & PID_MAX));

        self.write_section(PID_PAT, "PAT", section)
    }

    /// Writes a PMT listing `(stream_type, elementary_pid)` pairs, without
    /// descriptors. The first stream carries the PCR.
    pub fn write_pmt(
        &mut self,
        pmt_pid: u16,
        program_number: u16,
        streams: &[(u8, u16)],
    ) -> Result<()> {
        let section_length = 9 + 5 * streams.len() + 4;
        if 3 + section_length > MAX_SECTION_SIZE {
            return Err(ExtractError::MalformedTable {
                table: "PMT",
                reason: format!("{} streams do not fit in one packet", streams.len()),
            });
        }
        let pcr_pid = streams.first().map(|&(_, pid)| pid).unwrap_or(PID_NULL);

        let mut section = BytesMut::with_capacity(3 + section_length);
        section.put_u8(TABLE_ID_PMT);
        section.put_u16(0xB000 | section_length as u16);
        section.put_u16(program_number);
        section.put_u8(0xC1);
        section.put_u8(0);
        section.put_u8(0);
        section.put_u16(0xE000 | (pcr_pid & PID_MAX));
        section.put_u16(0xF000); // program_info_length
        for &(stream_type, pid) in streams {
            section.put_u8(stream_type);
            section.put_u16(0xE000 | (pid & PID_MAX));
            section.put_u16(0xF000);
        }

        self.write_section(pmt_pid, "PMT", section)
    }

    /// Appends the CRC and writes the section in one packet.
    fn write_section(&mut self, pid: u16, table: &'static str, mut section: BytesMut) -> Result<()> {
        let crc = self.crc.calculate(&section);
        section.put_u32(crc);
        if section.len() > MAX_SECTION_SIZE {
            return Err(ExtractError::MalformedTable {
                table,
                reason: format!("{} byte section does not fit in one packet", section.len()),
            });
        }

        let header = TSHeader {
            payload_unit_start: true,
            pid,
            continuity_counter: self.next_continuity_counter(pid),
            ..Default::default()
        };
        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
        header.write_to(&mut buf)?;
        buf.put_u8(0); // pointer_field
        buf.extend_from_slice(&section);
        buf.resize(TS_PACKET_SIZE, 0xFF);

        self.write_packet(&buf)
    }

    /// Wraps `payload` in a PES packet with no optional header fields and
    /// writes it on `pid`.
    pub fn write_pes(&mut self, pid: u16, stream_id: u8, payload: &[u8]) -> Result<()> {
        self.write_pes_with_header(pid, PESHeader::new(stream_id), payload)
    }

    /// Writes a PES packet with a caller-built header. PES_packet_length is
    /// filled in when it fits in 16 bits and left at 0 otherwise.
    pub fn write_pes_with_header(&mut self, pid: u16, mut header: PESHeader, payload: &[u8]) -> Result<()> {
        let packet_length = 3 + header.header_data_length as usize + payload.len();
        header.packet_length = u16::try_from(packet_length).unwrap_or(0);

        let mut pes = BytesMut::with_capacity(header.data_offset() + payload.len());
        header.write_to(&mut pes)?;
        pes.extend_from_slice(payload);

        let mut first = true;
        for chunk in pes.chunks(TS_PAYLOAD_SIZE) {
            self.write_payload(pid, first, chunk)?;
            first = false;
        }
        Ok(())
    }

    /// Writes one packet carrying `chunk`, padding with adaptation field
    /// stuffing when it is shorter than a full payload.
    fn write_payload(&mut self, pid: u16, payload_unit_start: bool, chunk: &[u8]) -> Result<()> {
        let stuffing = TS_PAYLOAD_SIZE - chunk.len();
        let mut header = TSHeader {
            payload_unit_start,
            pid,
            continuity_counter: self.next_continuity_counter(pid),
            ..Default::default()
        };
        if stuffing > 0 {
            header.adaptation_field_control = 0b11;
            header.adaptation_field_length = Some((stuffing - 1) as u8);
        }

        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
        header.write_to(&mut buf)?;
        if stuffing > 1 {
            buf.put_u8(0x00); // no adaptation flags
            buf.put_bytes(0xFF, stuffing - 2);
        }
        buf.extend_from_slice(chunk);

        self.write_packet(&buf)
    }

    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        debug_assert_eq!(packet.len(), TS_PACKET_SIZE);
        self.writer.write_all(packet).map_err(ExtractError::Output)?;
        self.packets_written += 1;
        Ok(())
    }
}
