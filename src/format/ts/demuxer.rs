use super::parser::TSPacketParser;
use super::pes::PESExtractor;
use super::pid_table::PidTable;
use super::psi::PsiParser;
use super::reader::TSPacketReader;
use super::types::*;
use crate::config::DemuxConfig;
use crate::error::{ExtractError, Result};
use crate::utils::Structure;
use log::{debug, info, trace, warn};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// How far the demuxer has got in discovering the audio stream.
///
/// - `AwaitingPat`: no PMT PID known yet.
/// - `AwaitingPmt`: PMT PIDs known from the PAT, no audio PID yet.
/// - `StreamingAudio`: at least one audio PID known; its packets are
///   extracted and PMTs are no longer parsed.
///
/// PID 0 is reparsed as a PAT in every state. A PAT never leaves
/// `StreamingAudio`; in the other two states it selects `AwaitingPmt` when it
/// lists at least one program and `AwaitingPat` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemuxState {
    #[default]
    AwaitingPat,
    AwaitingPmt,
    StreamingAudio,
}

/// What the demuxer did with one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketAction {
    /// Parsed as a PAT.
    Pat,
    /// Parsed as a PMT.
    Pmt,
    /// Audio payload written to the sink; carries the byte count.
    Audio(usize),
    /// Dropped.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Pat,
    Pmt,
    Audio,
    Ignore,
}

/// Outcome of a complete extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Codec of the extracted stream, `Unknown` if no audio PID was found.
    pub format: StreamFormat,
    /// Transport packets read.
    pub packets: u64,
    /// Packets whose payload went to the sink.
    pub audio_packets: u64,
    /// Elementary stream bytes written.
    pub bytes_written: u64,
    /// Bytes discarded while looking for sync bytes.
    pub skipped_bytes: u64,
    /// Audio PIDs in discovery order.
    pub audio_pids: Vec<u16>,
}

/// MPEG-TS demuxer that extracts the first AAC or MP3 stream it finds.
///
/// Owns the PID tables and the detected format. Each packet is routed by
/// [`process_packet`](Self::process_packet) according to [`DemuxState`];
/// [`run`](Self::run) drives a whole stream into a sink.
#[derive(Debug)]
pub struct TSAudioDemuxer {
    config: DemuxConfig,
    parser: TSPacketParser,
    psi: PsiParser,
    pes: PESExtractor,
    state: DemuxState,
    pmt_pids: PidTable,
    audio_pids: PidTable,
    format: StreamFormat,
    audio_packets: u64,
    bytes_written: u64,
    scrambled_warned: HashSet<u16>,
}

impl TSAudioDemuxer {
    pub fn new(config: DemuxConfig) -> Self {
        Self {
            parser: TSPacketParser::new(),
            psi: PsiParser::new(config.verify_crc, config.trace_packets),
            pes: PESExtractor::new(),
            state: DemuxState::AwaitingPat,
            pmt_pids: PidTable::new("PMT", config.pid_table_capacity),
            audio_pids: PidTable::new("audio", config.pid_table_capacity),
            format: StreamFormat::Unknown,
            audio_packets: 0,
            bytes_written: 0,
            scrambled_warned: HashSet::new(),
            config,
        }
    }

    pub fn state(&self) -> DemuxState {
        self.state
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn pmt_pids(&self) -> &PidTable {
        &self.pmt_pids
    }

    pub fn audio_pids(&self) -> &PidTable {
        &self.audio_pids
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Routes one packet and returns what was done with it.
    ///
    /// Nothing is written to `sink` unless the whole packet validates.
    pub fn process_packet<W: Write>(
        &mut self,
        packet: &TSPacket,
        sink: &mut W,
    ) -> Result<PacketAction> {
        let data = packet.as_bytes();
        let header = self.parser.parse_header(data)?;

        if self.config.trace_packets {
            trace!(
                "PID: {:#06x}({}) Payload Unit Start Indicator: {} Adaptation Field Control: {} Adaptation Field Length: {:?}",
                header.pid,
                header.pid,
                header.payload_unit_start as u8,
                header.adaptation_field_control,
                header.adaptation_field_length
            );
        }

        if header.transport_error && self.config.drop_transport_errors {
            warn!("Dropping packet on PID {:#06x} with transport error", header.pid);
            return Ok(PacketAction::Ignored);
        }

        if !header.has_payload() {
            return Ok(PacketAction::Ignored);
        }

        let route = self.route(header.pid);
        if route == Route::Ignore {
            return Ok(PacketAction::Ignored);
        }

        // Only packets that are actually consumed have to be well formed
        self.parser.check_adaptation_field(&header)?;
        let payload = self.parser.payload(&header, data);

        match route {
            Route::Pat => self.handle_pat(&header, payload),
            Route::Pmt => self.handle_pmt(&header, payload),
            Route::Audio => self.handle_audio(&header, payload, sink),
            Route::Ignore => Ok(PacketAction::Ignored),
        }
    }

    fn route(&self, pid: u16) -> Route {
        if pid == PID_PAT {
            return Route::Pat;
        }
        match self.state {
            DemuxState::StreamingAudio if self.audio_pids.contains(pid) => Route::Audio,
            DemuxState::AwaitingPmt if self.pmt_pids.contains(pid) => Route::Pmt,
            _ => Route::Ignore,
        }
    }

    fn handle_pat(&mut self, header: &TSHeader, payload: &[u8]) -> Result<PacketAction> {
        let Some(section) = self.psi.locate_section(header, payload, Structure::Pat)? else {
            return Ok(PacketAction::Ignored);
        };
        let Some(pat) = self.psi.parse_pat(section, &mut self.pmt_pids)? else {
            return Ok(PacketAction::Ignored);
        };

        if self.state != DemuxState::StreamingAudio {
            let next = if self.pmt_pids.is_empty() {
                DemuxState::AwaitingPat
            } else {
                DemuxState::AwaitingPmt
            };
            if next != self.state {
                debug!(
                    "PAT lists {} program(s) {:04x?}: {:?} -> {:?}",
                    pat.entries.len(),
                    self.pmt_pids.as_slice(),
                    self.state,
                    next
                );
                self.state = next;
            }
        }
        Ok(PacketAction::Pat)
    }

    fn handle_pmt(&mut self, header: &TSHeader, payload: &[u8]) -> Result<PacketAction> {
        let Some(section) = self.psi.locate_section(header, payload, Structure::Pmt)? else {
            return Ok(PacketAction::Ignored);
        };
        let Some(pmt) = self
            .psi
            .parse_pmt(section, &mut self.audio_pids, &mut self.format)?
        else {
            return Ok(PacketAction::Ignored);
        };

        debug!(
            "PMT on PID {:#06x} (program {}) lists {} stream(s)",
            header.pid,
            pmt.program_number,
            pmt.elementary_stream_infos.len()
        );
        if !self.audio_pids.is_empty() {
            debug!(
                "Audio PID(s) {:04x?} as {}: {:?} -> {:?}",
                self.audio_pids.as_slice(),
                self.format,
                self.state,
                DemuxState::StreamingAudio
            );
            self.state = DemuxState::StreamingAudio;
        }
        Ok(PacketAction::Pmt)
    }

    fn handle_audio<W: Write>(
        &mut self,
        header: &TSHeader,
        payload: &[u8],
        sink: &mut W,
    ) -> Result<PacketAction> {
        if header.is_scrambled() && self.scrambled_warned.insert(header.pid) {
            warn!(
                "Audio PID {:#06x} is scrambled; output will not be playable",
                header.pid
            );
        }

        let (pes_header, written) = self.pes.extract(payload, sink)?;
        if self.config.trace_packets {
            match &pes_header {
                Some(pes) => trace!(
                    "PES stream_id {:#04x} packet length {} header data length {} pts {:?}",
                    pes.stream_id,
                    pes.packet_length,
                    pes.header_data_length,
                    pes.pts
                ),
                None => trace!("PES continuation, {} bytes", written),
            }
        }

        self.audio_packets += 1;
        self.bytes_written += written as u64;
        Ok(PacketAction::Audio(written))
    }

    /// Reads every packet from `reader` and writes the extracted audio to
    /// `sink`, which is flushed before returning.
    pub fn run<R: Read, W: Write>(&mut self, reader: R, sink: &mut W) -> Result<ExtractSummary> {
        let mut packets = TSPacketReader::new(reader);

        while let Some(packet) = packets.read_packet()? {
            self.process_packet(&packet, sink)?;
        }
        sink.flush().map_err(ExtractError::Output)?;

        let summary = ExtractSummary {
            format: self.format,
            packets: packets.packets_read(),
            audio_packets: self.audio_packets,
            bytes_written: self.bytes_written,
            skipped_bytes: packets.skipped_bytes(),
            audio_pids: self.audio_pids.as_slice().to_vec(),
        };
        info!(
            "{} packets are found; {} bytes of {} audio from {} packet(s)",
            summary.packets, summary.bytes_written, summary.format, summary.audio_packets
        );
        if summary.skipped_bytes > 0 {
            debug!("{} bytes skipped between packets", summary.skipped_bytes);
        }
        Ok(summary)
    }
}

/// Extracts the audio stream of `input` into `output`.
///
/// `input` is buffered internally; `output` is flushed before returning.
pub fn extract<R: Read, W: Write>(
    input: R,
    output: &mut W,
    config: &DemuxConfig,
) -> Result<ExtractSummary> {
    let mut demuxer = TSAudioDemuxer::new(config.clone());
    demuxer.run(BufReader::new(input), output)
}

/// Extracts the audio stream of the file at `input_path` into a newly
/// created file at `output_path`, which is synced to disk on success.
///
/// The output file is left in place whatever the outcome; choosing its name
/// and cleaning up after a failure is up to the caller.
pub fn extract_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
    config: &DemuxConfig,
) -> Result<ExtractSummary> {
    let input = File::open(input_path.as_ref()).map_err(ExtractError::Input)?;
    let output = File::create(output_path.as_ref()).map_err(ExtractError::Output)?;
    debug!(
        "Extracting {} into {}",
        input_path.as_ref().display(),
        output_path.as_ref().display()
    );

    let mut writer = BufWriter::new(output);
    let summary = extract(input, &mut writer, config)?;
    let output = writer
        .into_inner()
        .map_err(|e| ExtractError::Output(e.into_error()))?;
    output.sync_all().map_err(ExtractError::Output)?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Crc32Mpeg2;
    use pretty_assertions::assert_eq;
    use std::io;

    fn packet(pid: u16, payload_unit_start: bool, payload: &[u8]) -> TSPacket {
        let mut data = [0xFFu8; TS_PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[1] = ((pid >> 8) as u8 & 0x1F) | if payload_unit_start { 0x40 } else { 0 };
        data[2] = pid as u8;
        data[3] = 0x10;
        data[4..4 + payload.len()].copy_from_slice(payload);
        TSPacket::new(data)
    }

    fn section_packet(pid: u16, mut section: Vec<u8>) -> TSPacket {
        let crc = Crc32Mpeg2::new().calculate(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section.insert(0, 0x00); // pointer_field
        packet(pid, true, &section)
    }

    fn pat(pmt_pids: &[u16]) -> TSPacket {
        let length = 9 + 4 * pmt_pids.len();
        let mut section = vec![0x00, 0xB0, length as u8, 0x00, 0x01, 0xC1, 0x00, 0x00];
        for (i, pid) in pmt_pids.iter().enumerate() {
            section.extend_from_slice(&(i as u16 + 1).to_be_bytes());
            section.extend_from_slice(&(0xE000 | pid).to_be_bytes());
        }
        section_packet(PID_PAT, section)
    }

    fn pmt(pid: u16, streams: &[(u8, u16)]) -> TSPacket {
        let length = 13 + 5 * streams.len();
        let mut section = vec![
            0x02, 0xB0, length as u8, 0x00, 0x01, 0xC1, 0x00, 0x00, 0xE1, 0x00, 0xF0, 0x00,
        ];
        for &(stream_type, es_pid) in streams {
            section.push(stream_type);
            section.extend_from_slice(&(0xE000 | es_pid).to_be_bytes());
            section.extend_from_slice(&[0xF0, 0x00]);
        }
        section_packet(pid, section)
    }

    #[test]
    fn test_state_transitions() {
        let mut demuxer = TSAudioDemuxer::new(DemuxConfig::default());
        let mut sink = Vec::new();
        assert_eq!(demuxer.state(), DemuxState::AwaitingPat);

        // Audio before PAT/PMT is dropped
        let audio = packet(0x31, false, &[0xAA; 184]);
        assert_eq!(demuxer.process_packet(&audio, &mut sink).unwrap(), PacketAction::Ignored);

        assert_eq!(demuxer.process_packet(&pat(&[0x20]), &mut sink).unwrap(), PacketAction::Pat);
        assert_eq!(demuxer.state(), DemuxState::AwaitingPmt);
        assert_eq!(demuxer.pmt_pids().as_slice(), &[0x20]);

        assert_eq!(
            demuxer.process_packet(&pmt(0x20, &[(0x1B, 0x30), (0x0F, 0x31)]), &mut sink).unwrap(),
            PacketAction::Pmt
        );
        assert_eq!(demuxer.state(), DemuxState::StreamingAudio);
        assert_eq!(demuxer.audio_pids().as_slice(), &[0x31]);
        assert_eq!(demuxer.format(), StreamFormat::AAC);

        assert_eq!(demuxer.process_packet(&audio, &mut sink).unwrap(), PacketAction::Audio(184));
        assert_eq!(sink, vec![0xAA; 184]);

        // Video PID stays ignored
        let video = packet(0x30, false, &[0xBB; 184]);
        assert_eq!(demuxer.process_packet(&video, &mut sink).unwrap(), PacketAction::Ignored);
    }

    #[test]
    fn test_pmt_without_audio_keeps_waiting() {
        let mut demuxer = TSAudioDemuxer::new(DemuxConfig::default());
        let mut sink = Vec::new();

        demuxer.process_packet(&pat(&[0x20]), &mut sink).unwrap();
        demuxer.process_packet(&pmt(0x20, &[(0x1B, 0x30)]), &mut sink).unwrap();
        assert_eq!(demuxer.state(), DemuxState::AwaitingPmt);

        // A later PMT version adds audio
        demuxer.process_packet(&pmt(0x20, &[(0x1B, 0x30), (0x04, 0x32)]), &mut sink).unwrap();
        assert_eq!(demuxer.state(), DemuxState::StreamingAudio);
        assert_eq!(demuxer.format(), StreamFormat::MP3);
    }

    #[test]
    fn test_pmts_are_locked_out_once_streaming() {
        let mut demuxer = TSAudioDemuxer::new(DemuxConfig::default());
        let mut sink = Vec::new();

        demuxer.process_packet(&pat(&[0x20, 0x40]), &mut sink).unwrap();
        demuxer.process_packet(&pmt(0x20, &[(0x0F, 0x31)]), &mut sink).unwrap();
        assert_eq!(demuxer.state(), DemuxState::StreamingAudio);

        // Second program's PMT arrives after audio is known: not parsed
        let second = pmt(0x40, &[(0x04, 0x41)]);
        assert_eq!(demuxer.process_packet(&second, &mut sink).unwrap(), PacketAction::Ignored);
        assert_eq!(demuxer.audio_pids().as_slice(), &[0x31]);
        assert_eq!(demuxer.format(), StreamFormat::AAC);

        // PAT is still reparsed but does not leave StreamingAudio
        assert_eq!(demuxer.process_packet(&pat(&[]), &mut sink).unwrap(), PacketAction::Pat);
        assert!(demuxer.pmt_pids().is_empty());
        assert_eq!(demuxer.state(), DemuxState::StreamingAudio);
    }

    #[test]
    fn test_empty_pat_returns_to_awaiting_pat() {
        let mut demuxer = TSAudioDemuxer::new(DemuxConfig::default());
        let mut sink = Vec::new();

        demuxer.process_packet(&pat(&[0x20]), &mut sink).unwrap();
        assert_eq!(demuxer.state(), DemuxState::AwaitingPmt);
        demuxer.process_packet(&pat(&[]), &mut sink).unwrap();
        assert_eq!(demuxer.state(), DemuxState::AwaitingPat);

        // The old PMT PID is no longer recognised
        let stale = pmt(0x20, &[(0x0F, 0x31)]);
        assert_eq!(demuxer.process_packet(&stale, &mut sink).unwrap(), PacketAction::Ignored);
    }

    #[test]
    fn test_psi_continuation_is_ignored() {
        let mut demuxer = TSAudioDemuxer::new(DemuxConfig::default());
        let mut sink = Vec::new();

        let continuation = packet(PID_PAT, false, &[0x00, 0xB0, 0x0D]);
        assert_eq!(
            demuxer.process_packet(&continuation, &mut sink).unwrap(),
            PacketAction::Ignored
        );
        assert_eq!(demuxer.state(), DemuxState::AwaitingPat);
    }

    #[test]
    fn test_transport_errors_dropped_when_configured() {
        let config = DemuxConfig::default().with_drop_transport_errors(true);
        let mut demuxer = TSAudioDemuxer::new(config);
        let mut sink = Vec::new();

        let mut data = pat(&[0x20]).as_bytes().to_vec();
        data[1] |= 0x80;
        let errored = TSPacket::from_slice(&data).unwrap();
        assert_eq!(demuxer.process_packet(&errored, &mut sink).unwrap(), PacketAction::Ignored);

        // Default config ignores the indicator
        let mut demuxer = TSAudioDemuxer::new(DemuxConfig::default());
        assert_eq!(demuxer.process_packet(&errored, &mut sink).unwrap(), PacketAction::Pat);
    }

    /// A packet with an adaptation field length of 240, past the packet end.
    fn corrupt(pid: u16, transport_error: bool) -> TSPacket {
        let mut data = packet(pid, false, &[0xEE; 184]).as_bytes().to_vec();
        if transport_error {
            data[1] |= 0x80;
        }
        data[3] = 0x30;
        data[4] = 0xF0;
        TSPacket::from_slice(&data).unwrap()
    }

    fn streaming_demuxer(config: DemuxConfig) -> TSAudioDemuxer {
        let mut demuxer = TSAudioDemuxer::new(config);
        let mut sink = Vec::new();
        demuxer.process_packet(&pat(&[0x20]), &mut sink).unwrap();
        demuxer
            .process_packet(&pmt(0x20, &[(0x1B, 0x30), (0x0F, 0x31)]), &mut sink)
            .unwrap();
        assert_eq!(demuxer.state(), DemuxState::StreamingAudio);
        demuxer
    }

    #[test]
    fn test_corrupt_packet_on_ignored_pid() {
        for config in [
            DemuxConfig::default(),
            DemuxConfig::default().with_drop_transport_errors(true),
        ] {
            let mut demuxer = streaming_demuxer(config);
            let mut sink = Vec::new();

            for packet in [corrupt(0x30, true), corrupt(0x30, false), corrupt(PID_NULL, false)] {
                assert_eq!(demuxer.process_packet(&packet, &mut sink).unwrap(), PacketAction::Ignored);
            }

            let audio = packet(0x31, false, &[0xAA; 184]);
            assert_eq!(demuxer.process_packet(&audio, &mut sink).unwrap(), PacketAction::Audio(184));
            assert_eq!(sink, vec![0xAA; 184]);
        }
    }

    #[test]
    fn test_corrupt_packet_on_audio_pid() {
        let mut demuxer = streaming_demuxer(DemuxConfig::default());
        let mut sink = Vec::new();

        assert!(matches!(
            demuxer.process_packet(&corrupt(0x31, false), &mut sink),
            Err(ExtractError::MalformedPacket(_))
        ));
        assert!(sink.is_empty());

        // Flagged by the transport layer: dropped before it is inspected
        let mut demuxer = streaming_demuxer(DemuxConfig::default().with_drop_transport_errors(true));
        assert_eq!(
            demuxer.process_packet(&corrupt(0x31, true), &mut sink).unwrap(),
            PacketAction::Ignored
        );
    }

    /// A sink whose writes (optionally) and flushes fail.
    struct FailingSink {
        fail_writes: bool,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    fn audio_stream() -> Vec<u8> {
        [pat(&[0x20]), pmt(0x20, &[(0x0F, 0x31)]), packet(0x31, false, &[0xAA; 184])]
            .iter()
            .flat_map(|packet| packet.as_bytes().to_vec())
            .collect()
    }

    #[test]
    fn test_sink_write_failure_is_output_error() {
        let mut demuxer = TSAudioDemuxer::new(DemuxConfig::default());
        let mut sink = FailingSink { fail_writes: true };

        match demuxer.run(&audio_stream()[..], &mut sink) {
            Err(ExtractError::Output(e)) => assert_eq!(e.to_string(), "disk full"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_sink_flush_failure_is_output_error() {
        let mut sink = FailingSink { fail_writes: false };
        assert!(matches!(
            extract(&audio_stream()[..], &mut sink, &DemuxConfig::default()),
            Err(ExtractError::Output(_))
        ));
    }
}
