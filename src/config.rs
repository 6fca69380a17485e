use crate::error::{ExtractError, Result};
use std::env;
use std::fs;
use std::path::Path;

/// Default capacity of each PID table.
pub const DEFAULT_PID_TABLE_CAPACITY: usize = 16;

const CONFIG_PATHS: [&str; 2] = ["./tsaudio.toml", "./tsaudio_config.toml"];

/// Settings threaded into the demuxer at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxConfig {
    /// Upper bound on entries in the PMT PID table and the audio PID table.
    pub pid_table_capacity: usize,
    /// Check the CRC_32 of every PAT and PMT section before using it.
    pub verify_crc: bool,
    /// Skip packets that have the transport_error_indicator set.
    pub drop_transport_errors: bool,
    /// Emit per-packet `trace` logging.
    pub trace_packets: bool,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            pid_table_capacity: DEFAULT_PID_TABLE_CAPACITY,
            verify_crc: false,
            drop_transport_errors: false,
            trace_packets: false,
        }
    }
}

impl DemuxConfig {
    /// Defaults, then the first config file found in the working directory,
    /// then `TSAUDIO_*` environment variables.
    pub fn load() -> Result<Self> {
        let mut config = DemuxConfig::default();

        for path in &CONFIG_PATHS {
            if Path::new(path).exists() {
                config.apply_file(path)?;
                break;
            }
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Reads `key = value` lines from `path` on top of the current values.
    pub fn apply_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let content = fs::read_to_string(path)?;
        self.apply_str(&content)
    }

    /// Parses `key = value` lines. Blank lines and `#` comments are skipped;
    /// unknown keys are ignored.
    pub fn apply_str(&mut self, content: &str) -> Result<()> {
        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ExtractError::Config(format!("expected key = value, got '{}'", line)));
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            self.set(key.trim(), value)?;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        let vars = [
            ("TSAUDIO_PID_TABLE_CAPACITY", "pid_table_capacity"),
            ("TSAUDIO_VERIFY_CRC", "verify_crc"),
            ("TSAUDIO_DROP_TRANSPORT_ERRORS", "drop_transport_errors"),
            ("TSAUDIO_TRACE_PACKETS", "trace_packets"),
        ];
        for (var, key) in vars {
            if let Ok(value) = env::var(var) {
                self.set(key, value.trim())?;
            }
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "pid_table_capacity" => {
                let capacity: usize = value.parse().map_err(|_| {
                    ExtractError::Config(format!("pid_table_capacity: '{}' is not a number", value))
                })?;
                if capacity == 0 {
                    return Err(ExtractError::Config(
                        "pid_table_capacity must be at least 1".into(),
                    ));
                }
                self.pid_table_capacity = capacity;
            }
            "verify_crc" => self.verify_crc = parse_bool(key, value)?,
            "drop_transport_errors" => self.drop_transport_errors = parse_bool(key, value)?,
            "trace_packets" => self.trace_packets = parse_bool(key, value)?,
            _ => log::debug!("Ignoring unknown config key '{}'", key),
        }
        Ok(())
    }

    pub fn with_pid_table_capacity(mut self, capacity: usize) -> Self {
        self.pid_table_capacity = capacity;
        self
    }

    pub fn with_verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    pub fn with_drop_transport_errors(mut self, drop: bool) -> Self {
        self.drop_transport_errors = drop;
        self
    }

    pub fn with_trace_packets(mut self, trace: bool) -> Self {
        self.trace_packets = trace;
        self
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ExtractError::Config(format!(
            "{}: '{}' is not a boolean",
            key, value
        ))),
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> Result<()> {
    if !path.as_ref().exists() {
        let template = format!(
            r#"# tsaudio configuration
# Copy this file to 'tsaudio.toml' and adjust as needed.

# Maximum number of PMT PIDs / audio PIDs tracked per run
pid_table_capacity = {}

# Reject PAT/PMT sections whose CRC_32 does not match
verify_crc = false

# Skip packets flagged with transport_error_indicator
drop_transport_errors = false

# Per-packet trace logging
trace_packets = false
"#,
            DEFAULT_PID_TABLE_CAPACITY
        );
        fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_str() {
        let mut config = DemuxConfig::default();
        config
            .apply_str(
                "# comment\n\npid_table_capacity = 4\nverify_crc = \"true\" # trailing\nunknown = 1\n",
            )
            .unwrap();

        assert_eq!(
            config,
            DemuxConfig::default()
                .with_pid_table_capacity(4)
                .with_verify_crc(true)
        );
    }

    #[test]
    fn test_invalid_values() {
        let mut config = DemuxConfig::default();
        assert!(matches!(
            config.apply_str("pid_table_capacity = many"),
            Err(ExtractError::Config(_))
        ));
        assert!(matches!(
            config.apply_str("pid_table_capacity = 0"),
            Err(ExtractError::Config(_))
        ));
        assert!(matches!(
            config.apply_str("trace_packets = maybe"),
            Err(ExtractError::Config(_))
        ));
        assert!(matches!(
            config.apply_str("verify_crc"),
            Err(ExtractError::Config(_))
        ));
    }

    #[test]
    fn test_template_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsaudio.toml");

        create_default_config_template(&path).unwrap();
        let mut config = DemuxConfig::default().with_trace_packets(true);
        config.apply_file(&path).unwrap();
        assert_eq!(config, DemuxConfig::default());

        // An existing file is left alone
        fs::write(&path, "verify_crc = yes\n").unwrap();
        create_default_config_template(&path).unwrap();
        config.apply_file(&path).unwrap();
        assert!(config.verify_crc);
    }
}
