// src/cli.rs
//
// Command-line flags. Anything given here overrides the config file.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::settings::LoggerSettings;

/// How engine notifications are written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EventFormat {
    /// Timestamped lines on stderr
    #[default]
    Text,
    /// One JSON object per line on stdout
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "chronosense",
    version,
    about = "Log comma-separated sensor readings from a serial device to timestamped CSV files"
)]
pub struct Cli {
    /// Serial port (auto-detected when omitted)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Directory for CSV log files
    #[arg(short = 'd', long)]
    pub log_dir: Option<PathBuf>,

    /// Log file name prefix
    #[arg(short = 'f', long)]
    pub prefix: Option<String>,

    /// Maximum port discovery attempts
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// Settings file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Also write diagnostics to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Notification format
    #[arg(long, value_enum, default_value_t = EventFormat::Text)]
    pub events: EventFormat,

    /// List visible serial ports and exit
    #[arg(long)]
    pub list_ports: bool,
}

impl Cli {
    pub fn apply_to(&self, settings: &mut LoggerSettings) {
        if let Some(port) = &self.port {
            settings.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            settings.baud_rate = baud;
        }
        if let Some(dir) = &self.log_dir {
            settings.log_dir = dir.clone();
        }
        if let Some(prefix) = &self.prefix {
            settings.log_prefix = prefix.clone();
        }
        if let Some(retries) = self.retries {
            settings.max_retries = retries;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_settings() {
        let cli = Cli::parse_from([
            "chronosense",
            "-p",
            "/dev/ttyACM3",
            "-b",
            "9600",
            "-d",
            "out",
            "-f",
            "lab",
            "-r",
            "2",
        ]);
        let mut settings = LoggerSettings::default();
        cli.apply_to(&mut settings);

        assert_eq!(settings.port.as_deref(), Some("/dev/ttyACM3"));
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.log_dir, PathBuf::from("out"));
        assert_eq!(settings.log_prefix, "lab");
        assert_eq!(settings.max_retries, 2);
    }

    #[test]
    fn test_absent_flags_keep_settings() {
        let cli = Cli::parse_from(["chronosense"]);
        let mut settings = LoggerSettings {
            baud_rate: 57_600,
            ..Default::default()
        };
        cli.apply_to(&mut settings);

        assert_eq!(settings.baud_rate, 57_600);
        assert_eq!(cli.events, EventFormat::Text);
        assert!(!cli.list_ports);
    }

    #[test]
    fn test_json_events_flag() {
        let cli = Cli::parse_from(["chronosense", "--events", "json", "--list-ports"]);
        assert_eq!(cli.events, EventFormat::Json);
        assert!(cli.list_ports);
    }
}
