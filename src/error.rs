// src/error.rs
//
// Error taxonomy for the data-logging engine.
// Only ConnectError and LogFileError (at start-up) and read I/O errors end a
// session. MigrationError and per-record failures are reported and survived.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(
        "no serial port matched after {attempts} attempts; {}",
        describe_visible_ports(.visible_ports)
    )]
    Exhausted {
        attempts: u32,
        /// `device: description` for every port visible at the time of failure
        visible_ports: Vec<String>,
    },

    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("port search cancelled")]
    Cancelled,
}

fn describe_visible_ports(ports: &[String]) -> String {
    if ports.is_empty() {
        "no serial ports visible".to_string()
    } else {
        format!("visible ports: {}", ports.join(", "))
    }
}

#[derive(Debug, Error)]
pub enum LogFileError {
    #[error("I/O error while {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error while {operation} {path}: {source}")]
    Csv {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl LogFileError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn csv(operation: &'static str, path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            operation,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("could not rewrite header: {0}")]
    Header(#[source] LogFileError),

    #[error("could not read existing rows: {0}")]
    Read(#[source] LogFileError),

    #[error("could not create replacement file: {0}")]
    Create(#[source] LogFileError),

    #[error("could not transfer rows to {path}: {source}")]
    Transfer {
        path: PathBuf,
        #[source]
        source: LogFileError,
    },

    /// Rows were moved and the new file is active, but the superseded file is still on disk.
    #[error("migrated, but could not remove superseded file {path}: {source}")]
    RemoveOld {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already started; construct a new session to log again")]
    NotIdle,

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("failed to create log file: {0}")]
    LogFile(#[from] LogFileError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_lists_ports() {
        let err = ConnectError::Exhausted {
            attempts: 3,
            visible_ports: vec!["/dev/ttyS0: ttyS0".to_string(), "/dev/ttyUSB0: CP2102".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "no serial port matched after 3 attempts; visible ports: /dev/ttyS0: ttyS0, /dev/ttyUSB0: CP2102"
        );
    }

    #[test]
    fn test_exhausted_without_ports() {
        let err = ConnectError::Exhausted {
            attempts: 5,
            visible_ports: Vec::new(),
        };
        assert!(err.to_string().ends_with("no serial ports visible"));
    }
}
