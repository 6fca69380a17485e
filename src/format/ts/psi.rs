use super::pid_table::PidTable;
use super::types::*;
use crate::error::{ExtractError, Result};
use crate::utils::crc::Crc32Mpeg2;
use crate::utils::{ByteCursor, Structure};
use log::{debug, trace};

/// Offset of the first program entry in a PAT section (table_id through
/// last_section_number precede it).
const PAT_ENTRIES_OFFSET: usize = 8;
/// Offset of the first elementary stream entry in a PMT section when
/// program_info_length is zero.
const PMT_FIXED_LENGTH: usize = 12;
/// table_id plus the two section_length bytes.
const SECTION_HEADER_SIZE: usize = 3;
const CRC_SIZE: usize = 4;
/// Smallest section_length with a long header and a CRC.
const MIN_PAT_SECTION_LENGTH: usize = 5 + CRC_SIZE;
const MIN_PMT_SECTION_LENGTH: usize = 9 + CRC_SIZE;

/// Parses PAT and PMT sections into the demuxer's PID tables.
#[derive(Debug, Clone)]
pub struct PsiParser {
    crc: Crc32Mpeg2,
    verify_crc: bool,
    trace: bool,
}

impl PsiParser {
    pub fn new(verify_crc: bool, trace: bool) -> Self {
        Self {
            crc: Crc32Mpeg2::new(),
            verify_crc,
            trace,
        }
    }

    /// Locates the start of a section inside a PSI packet's payload.
    ///
    /// Only packets with payload_unit_start set begin a section; their first
    /// payload byte is the pointer_field. Continuation packets yield `None`.
    pub fn locate_section<'a>(
        &self,
        header: &TSHeader,
        payload: &'a [u8],
        structure: Structure,
    ) -> Result<Option<&'a [u8]>> {
        if !header.payload_unit_start || payload.is_empty() {
            return Ok(None);
        }
        let start = 1 + payload[0] as usize;
        if start >= payload.len() {
            return Err(structure.malformed(format!(
                "pointer_field {} points past the {} byte payload",
                payload[0],
                payload.len()
            )));
        }
        Ok(Some(&payload[start..]))
    }

    /// Bounds the section to `3 + section_length` bytes, checking that the
    /// packet actually holds that many and, if enabled, the CRC.
    fn bound_section<'a>(
        &self,
        data: &'a [u8],
        structure: Structure,
        min_length: usize,
    ) -> Result<&'a [u8]> {
        let mut cursor = ByteCursor::new(data, structure);
        cursor.skip(1)?;
        let section_length = cursor.read_length12()?;

        if section_length < min_length {
            return Err(structure.malformed(format!(
                "section_length {} is shorter than the minimum {}",
                section_length, min_length
            )));
        }
        let section_end = SECTION_HEADER_SIZE + section_length;
        if section_end > data.len() {
            return Err(structure.malformed(format!(
                "section_length {} runs past the {} bytes available",
                section_length,
                data.len() - SECTION_HEADER_SIZE
            )));
        }

        let section = &data[..section_end];
        if self.verify_crc {
            if let Some((expected, computed)) = self.crc.check_section(section) {
                if expected != computed {
                    return Err(ExtractError::CrcMismatch {
                        table: table_name(structure),
                        expected,
                        computed,
                    });
                }
            }
        }
        Ok(section)
    }

    /// Parses a PAT section starting at its table_id.
    ///
    /// The PMT PID table is cleared and rebuilt from the section's program
    /// entries, in order. Entries run from offset 8 up to the CRC_32.
    /// Returns `None` without touching the table when the bytes are not a PAT.
    pub fn parse_pat(&self, data: &[u8], pmt_pids: &mut PidTable) -> Result<Option<PAT>> {
        let table_id = ByteCursor::new(data, Structure::Pat).peek_u8()?;
        if table_id != TABLE_ID_PAT {
            debug!("Skipping section with table_id {:#04x} on the PAT PID", table_id);
            return Ok(None);
        }

        let section = self.bound_section(data, Structure::Pat, MIN_PAT_SECTION_LENGTH)?;
        let entries_end = section.len() - CRC_SIZE;
        if (entries_end - PAT_ENTRIES_OFFSET) % 4 != 0 {
            debug!(
                "PAT program loop is {} bytes, not a multiple of 4; ignoring the remainder",
                entries_end - PAT_ENTRIES_OFFSET
            );
        }

        let mut cursor = ByteCursor::new(section, Structure::Pat);
        cursor.seek(SECTION_HEADER_SIZE)?;
        let mut pat = PAT {
            transport_stream_id: cursor.read_u16()?,
            entries: Vec::new(),
        };
        if self.trace {
            trace!("Section Length: {}", section.len() - SECTION_HEADER_SIZE);
        }

        cursor.seek(PAT_ENTRIES_OFFSET)?;
        pmt_pids.clear();
        while cursor.position() + 4 <= entries_end {
            let entry = PATEntry {
                program_number: cursor.read_u16()?,
                program_map_pid: cursor.read_pid()?,
            };
            if self.trace {
                trace!(
                    "Program Num: {:#06x}({}) PMT PID: {:#06x}({})",
                    entry.program_number,
                    entry.program_number,
                    entry.program_map_pid,
                    entry.program_map_pid
                );
            }
            pmt_pids.push(entry.program_map_pid)?;
            pat.entries.push(entry);
        }

        Ok(Some(pat))
    }

    /// Parses a PMT section starting at its table_id.
    ///
    /// Every AAC (0x0F, 0x11) or MP3 (0x04) elementary PID is appended to
    /// `audio_pids` and `format` is set to its codec; a later match
    /// overwrites an earlier one. Other stream types are skipped.
    /// Returns `None` without touching the table when the bytes are not a PMT.
    pub fn parse_pmt(
        &self,
        data: &[u8],
        audio_pids: &mut PidTable,
        format: &mut StreamFormat,
    ) -> Result<Option<PMT>> {
        let table_id = ByteCursor::new(data, Structure::Pmt).peek_u8()?;
        if table_id != TABLE_ID_PMT {
            debug!("Skipping section with table_id {:#04x} on a PMT PID", table_id);
            return Ok(None);
        }

        let section = self.bound_section(data, Structure::Pmt, MIN_PMT_SECTION_LENGTH)?;
        let loop_end = section.len() - CRC_SIZE;

        let mut cursor = ByteCursor::new(section, Structure::Pmt);
        cursor.seek(SECTION_HEADER_SIZE)?;
        let program_number = cursor.read_u16()?;
        cursor.seek(8)?;
        let pcr_pid = cursor.read_pid()?;
        let program_info_length = cursor.read_length12()?;
        if self.trace {
            trace!("Section Length: {}", section.len() - SECTION_HEADER_SIZE);
            trace!("Program Info Length: {}", program_info_length);
        }

        let es_start = PMT_FIXED_LENGTH + program_info_length;
        if es_start > loop_end {
            return Err(Structure::Pmt.malformed(format!(
                "program_info_length {} runs into the CRC",
                program_info_length
            )));
        }
        cursor.seek(es_start)?;

        let mut pmt = PMT {
            program_number,
            pcr_pid,
            program_info_length,
            elementary_stream_infos: Vec::new(),
        };

        while cursor.position() < loop_end {
            if cursor.position() + 5 > loop_end {
                return Err(Structure::Pmt.malformed(format!(
                    "truncated elementary stream entry at offset {}",
                    cursor.position()
                )));
            }
            let info = ElementaryStreamInfo {
                stream_type: cursor.read_u8()?,
                elementary_pid: cursor.read_pid()?,
                es_info_length: cursor.read_length12()?,
            };
            if cursor.position() + info.es_info_length > loop_end {
                return Err(Structure::Pmt.malformed(format!(
                    "ES_info_length {} of PID {:#06x} runs into the CRC",
                    info.es_info_length, info.elementary_pid
                )));
            }
            cursor.skip(info.es_info_length)?;

            if self.trace {
                trace!(
                    "Stream Type: {:#04x}({}) Elementary PID: {:#06x}({}) ES Info Length: {}",
                    info.stream_type,
                    info.stream_type,
                    info.elementary_pid,
                    info.elementary_pid,
                    info.es_info_length
                );
            }

            if let Some(audio) = info.audio_format() {
                debug!(
                    "Found {} stream on PID {:#06x} (stream_type {:#04x})",
                    audio, info.elementary_pid, info.stream_type
                );
                audio_pids.push(info.elementary_pid)?;
                *format = audio;
            }
            pmt.elementary_stream_infos.push(info);
        }

        Ok(Some(pmt))
    }
}

fn table_name(structure: Structure) -> &'static str {
    match structure {
        Structure::Pmt => "PMT",
        _ => "PAT",
    }
}
