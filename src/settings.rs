// src/settings.rs
//
// Logger settings: defaults, optional TOML config file, and conversion into
// the session/serial configuration the engine consumes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::datalog::{LogNaming, SessionConfig};
use crate::io::serial::{Parity, SerialConfig, DEFAULT_PORT_SIGNATURES};

const CONFIG_DIR_NAME: &str = "chronosense";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoggerSettings {
    /// Serial device; discovered by signature when unset
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Case-insensitive substrings matched against port descriptions
    #[serde(default = "default_port_signatures")]
    pub port_signatures: Vec<String>,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

fn default_baud_rate() -> u32 {
    115_200
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_log_prefix() -> String {
    "microbit_data".to_string()
}
fn default_max_retries() -> u32 {
    crate::datalog::session::DEFAULT_MAX_ATTEMPTS
}
fn default_retry_delay_ms() -> u64 {
    2000
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_port_signatures() -> Vec<String> {
    DEFAULT_PORT_SIGNATURES.iter().map(|s| s.to_string()).collect()
}
fn default_max_line_length() -> usize {
    crate::io::serial::framer::DEFAULT_MAX_LINE_LENGTH
}
fn default_progress_every() -> u64 {
    crate::datalog::session::DEFAULT_PROGRESS_EVERY
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            port_signatures: default_port_signatures(),
            max_line_length: default_max_line_length(),
            progress_every: default_progress_every(),
        }
    }
}

impl LoggerSettings {
    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity.clone(),
            read_timeout: Duration::from_millis(self.read_timeout_ms.max(1)),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            port: self.port.clone(),
            serial: self.serial_config(),
            naming: LogNaming::new(&self.log_dir, &self.log_prefix),
            max_attempts: self.max_retries,
            max_line_length: self.max_line_length,
            progress_every: self.progress_every,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Reject values the serial driver or the engine cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.baud_rate == 0 {
            return Err("baud_rate must be greater than zero".to_string());
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(format!("data_bits must be 5-8, got {}", self.data_bits));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(format!("stop_bits must be 1 or 2, got {}", self.stop_bits));
        }
        if self.log_prefix.trim().is_empty() {
            return Err("log_prefix must not be empty".to_string());
        }
        if self.max_line_length == 0 {
            return Err("max_line_length must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// `<config dir>/chronosense/config.toml`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn parse_settings(content: &str) -> Result<LoggerSettings, String> {
    toml::from_str(content).map_err(|e| format!("Failed to parse settings: {}", e))
}

/// Load settings from `explicit` (which must exist), else from the default
/// config path when present, else defaults.
pub fn load_settings(explicit: Option<&Path>) -> Result<LoggerSettings, String> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(LoggerSettings::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read settings {}: {}", path.display(), e))?;

    parse_settings(&content)
}

/// Create the log directory if needed.
pub fn initialize_log_dir(settings: &LoggerSettings) -> Result<(), String> {
    std::fs::create_dir_all(&settings.log_dir).map_err(|e| {
        format!(
            "Failed to create log directory {}: {}",
            settings.log_dir.display(),
            e
        )
    })
}
