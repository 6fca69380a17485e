use super::types::*;
use crate::error::{ExtractError, Result};
use std::io::{ErrorKind, Read};

/// Packet synchronizer: pulls 188-byte transport packets out of a byte stream.
///
/// Bytes are consumed one at a time until a sync byte (0x47) turns up; that
/// byte and the 187 following it form the next packet. Bytes outside that
/// alignment are discarded. The byte after a packet is not required to be a
/// sync byte; the search simply starts again there.
///
/// The reader does single-byte reads, so hand it a buffered source.
#[derive(Debug)]
pub struct TSPacketReader<R> {
    reader: R,
    offset: u64,
    packets: u64,
    skipped_bytes: u64,
    failed: bool,
}

impl<R: Read> TSPacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            packets: 0,
            skipped_bytes: 0,
            failed: false,
        }
    }

    /// Reads the next packet.
    ///
    /// Returns `Ok(None)` at end of input. A sync byte followed by fewer than
    /// 187 bytes is a [`ExtractError::TruncatedPacket`].
    pub fn read_packet(&mut self) -> Result<Option<TSPacket>> {
        let mut packet = [0u8; TS_PACKET_SIZE];

        loop {
            let Some(byte) = self.read_byte()? else {
                return Ok(None);
            };
            if byte == SYNC_BYTE {
                packet[0] = byte;
                break;
            }
            self.skipped_bytes += 1;
        }

        let sync_offset = self.offset - 1;
        let filled = 1 + self.fill(&mut packet[1..])?;
        if filled < TS_PACKET_SIZE {
            return Err(ExtractError::TruncatedPacket {
                offset: sync_offset,
                available: filled,
            });
        }

        self.packets += 1;
        Ok(Some(TSPacket::new(packet)))
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.offset += 1;
                    return Ok(Some(byte[0]));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ExtractError::Input(e)),
            }
        }
    }

    /// Reads until `buf` is full or the input ends; returns bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    self.offset += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ExtractError::Input(e)),
            }
        }
        Ok(filled)
    }

    /// Packets returned so far.
    pub fn packets_read(&self) -> u64 {
        self.packets
    }

    /// Bytes discarded while searching for a sync byte.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    /// Bytes consumed from the underlying reader.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Yields packets until the end of input or the first error, after which it
/// only returns `None`.
impl<R: Read> Iterator for TSPacketReader<R> {
    type Item = Result<TSPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.read_packet().transpose();
        if matches!(next, Some(Err(_))) {
            self.failed = true;
        }
        next
    }
}
