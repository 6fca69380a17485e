//! Extracts the AAC or MP3 track of a transport stream file.
//!
//! ```text
//! cargo run --example extract_audio -- capture.ts          # writes capture.aac or capture.mp3
//! cargo run --example extract_audio -- --debug capture.ts  # with per-packet trace output
//! cargo run --example extract_audio -- --synthesize demo.ts
//! ```

use clap::Parser;
use log::{error, info};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tsaudio::format::ts::{TSPacketWriter, STREAM_ID_AUDIO, STREAM_TYPE_AAC};
use tsaudio::{extract_file, DemuxConfig, ExtractError, ExtractSummary, Result};

#[derive(Debug, Parser)]
#[command(name = "extract_audio", about = "Extract the audio elementary stream of an MPEG-TS file")]
struct Cli {
    /// Log every packet's header and table entries
    #[arg(long)]
    debug: bool,

    /// Read settings from this file instead of ./tsaudio.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write a short synthetic AAC stream to INPUT instead of extracting
    #[arg(long)]
    synthesize: bool,

    /// Transport stream file, must end in .ts
    #[arg(value_name = "INPUT.ts")]
    input: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .init();

    let result = if cli.synthesize {
        synthesize(&cli.input)
    } else {
        load_config(&cli).and_then(|config| run(&cli.input, &config).map(|_| ()))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<DemuxConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = DemuxConfig::default();
            config.apply_file(path)?;
            config
        }
        None => DemuxConfig::load()?,
    };
    if cli.debug {
        config.trace_packets = true;
    }
    Ok(config)
}

/// Extracts into `INPUT.part` and renames it after the detected codec.
fn run(input: &Path, config: &DemuxConfig) -> Result<ExtractSummary> {
    if input.extension().map_or(true, |ext| ext != "ts") {
        return Err(ExtractError::Config(format!(
            "{} is not a .ts file",
            input.display()
        )));
    }
    let partial = input.with_extension("part");

    let outcome = extract_file(input, &partial, config).and_then(|summary| {
        let ext = summary.format.extension().ok_or(ExtractError::NoAudioStream)?;
        let output = input.with_extension(ext);
        fs::rename(&partial, &output).map_err(ExtractError::Output)?;
        info!(
            "Wrote {} bytes of {} audio to {}",
            summary.bytes_written,
            summary.format,
            output.display()
        );
        Ok(summary)
    });

    if outcome.is_err() && partial.exists() {
        let _ = fs::remove_file(&partial);
    }
    outcome
}

/// A few ADTS-looking frames behind a PAT and a PMT.
fn synthesize(path: &Path) -> Result<()> {
    let file = File::create(path).map_err(ExtractError::Output)?;
    let mut writer = TSPacketWriter::new(BufWriter::new(file));

    writer.write_pat(1, 0x1000)?;
    writer.write_pmt(0x1000, 1, &[(STREAM_TYPE_AAC, 0x101)])?;
    for n in 0..32u8 {
        let mut frame = vec![0xFF, 0xF1, 0x50, 0x80, 0x02, 0x1F, 0xFC];
        frame.resize(400, n);
        writer.write_pes(0x101, STREAM_ID_AUDIO, &frame)?;
    }
    writer.flush()?;

    info!("Wrote {} packets to {}", writer.packets_written(), path.display());
    Ok(())
}
