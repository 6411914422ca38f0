// src/events.rs
//
// Structured notifications emitted by the logging engine.
// The engine never prints; it hands LogEvents to an EventSink, which decides
// formatting and destination (timestamped text or JSON lines).

use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::io::StopReason;

// ============================================================================
// Types
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Error,
}

/// Every notification the engine can produce.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    PortSearch { attempt: u32, max_attempts: u32 },
    PortSearchRetry { delay_ms: u64 },
    PortFound { port: String },
    PortNotFound { attempts: u32, visible_ports: Vec<String> },
    Connecting { port: String, baud_rate: u32 },
    Connected { port: String },
    ConnectFailed { port: String, error: String },
    Disconnected { port: String },
    LogFileCreated { path: PathBuf },
    LogFileCreateFailed { error: String },
    WaitingForData,
    SchemaChanged { fields: Vec<String> },
    HeaderWritten { path: PathBuf, fields: Vec<String> },
    Migrated { from: PathBuf, to: PathBuf, rows: usize, fields: Vec<String> },
    MigrationFailed { error: String },
    OldLogNotRemoved { path: PathBuf, error: String },
    Progress { count: u64, last_values: Vec<String> },
    RecordError { error: String },
    ReadError { error: String },
    ShutdownRequested,
    LogFileSaved { path: PathBuf, records: u64 },
    SessionStopped { reason: StopReason, records: u64 },
}

impl LogEvent {
    pub fn level(&self) -> Level {
        match self {
            LogEvent::PortNotFound { .. }
            | LogEvent::ConnectFailed { .. }
            | LogEvent::LogFileCreateFailed { .. }
            | LogEvent::MigrationFailed { .. }
            | LogEvent::OldLogNotRemoved { .. }
            | LogEvent::RecordError { .. }
            | LogEvent::ReadError { .. } => Level::Error,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEvent::PortSearch {
                attempt,
                max_attempts,
            } => write!(
                f,
                "Looking for Microbit... (attempt {}/{})",
                attempt, max_attempts
            ),
            LogEvent::PortSearchRetry { delay_ms } => write!(
                f,
                "Microbit not found. Retrying in {} seconds...",
                *delay_ms as f64 / 1000.0
            ),
            LogEvent::PortFound { port } => write!(f, "Microbit found on port {}", port),
            LogEvent::PortNotFound {
                attempts,
                visible_ports,
            } => {
                if visible_ports.is_empty() {
                    write!(
                        f,
                        "No serial ports found after {} attempts. Is the Microbit connected?",
                        attempts
                    )
                } else {
                    write!(
                        f,
                        "Microbit not found after {} attempts. Available ports:",
                        attempts
                    )?;
                    for port in visible_ports {
                        write!(f, "\n  - {}", port)?;
                    }
                    Ok(())
                }
            }
            LogEvent::Connecting { port, baud_rate } => write!(
                f,
                "Connecting to Microbit on port {} at {} baud...",
                port, baud_rate
            ),
            LogEvent::Connected { port } => write!(f, "Connected successfully to {}", port),
            LogEvent::ConnectFailed { port, error } => {
                write!(f, "Failed to connect to {}: {}", port, error)
            }
            LogEvent::Disconnected { port } => write!(f, "Disconnected from {}", port),
            LogEvent::LogFileCreated { path } => {
                write!(f, "Logging data to {}", path.display())
            }
            LogEvent::LogFileCreateFailed { error } => {
                write!(f, "Failed to create log file: {}", error)
            }
            LogEvent::WaitingForData => write!(f, "Waiting for data from Microbit..."),
            LogEvent::SchemaChanged { fields } => write!(
                f,
                "Data format changed, updating log file headers: {}",
                fields.join(", ")
            ),
            LogEvent::HeaderWritten { path, fields } => write!(
                f,
                "Header for {} set to: {}",
                path.display(),
                fields.join(", ")
            ),
            LogEvent::Migrated {
                from,
                to,
                rows,
                fields,
            } => write!(
                f,
                "Log file updated with new fields: {} ({} rows moved from {} to {})",
                fields.join(", "),
                rows,
                from.display(),
                to.display()
            ),
            LogEvent::MigrationFailed { error } => {
                write!(f, "Log file migration failed, keeping current file: {}", error)
            }
            LogEvent::OldLogNotRemoved { path, error } => write!(
                f,
                "Log file updated, but the previous file {} could not be removed: {}",
                path.display(),
                error
            ),
            LogEvent::Progress { count, last_values } => write!(
                f,
                "Received {} data points - Last values: {}",
                count,
                last_values.join(", ")
            ),
            LogEvent::RecordError { error } => write!(f, "Error processing data: {}", error),
            LogEvent::ReadError { error } => write!(f, "Error during logging: {}", error),
            LogEvent::ShutdownRequested => write!(f, "Shutdown signal received, stopping..."),
            LogEvent::LogFileSaved { path, records } => write!(
                f,
                "Log file saved: {} ({} records)",
                path.display(),
                records
            ),
            LogEvent::SessionStopped { reason, records } => write!(
                f,
                "Logging stopped ({}) after {} records",
                reason, records
            ),
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Destination for engine notifications.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Renders events as timestamped text through `tlog!`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextSink;

impl EventSink for TextSink {
    fn emit(&self, event: LogEvent) {
        match event.level() {
            Level::Info => tlog!("{}", event),
            Level::Error => tlog_error!("{}", event),
        }
    }
}

/// Render an event as one JSON object carrying `timestamp`, `level`,
/// `event`, a human-readable `message` and the event's own fields.
pub fn render_json(event: &LogEvent) -> String {
    let mut value = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
    if let serde_json::Value::Object(ref mut map) = value {
        map.insert(
            "timestamp".to_string(),
            serde_json::Value::String(chrono::Local::now().to_rfc3339()),
        );
        map.insert(
            "level".to_string(),
            serde_json::to_value(event.level()).unwrap_or(serde_json::Value::Null),
        );
        map.insert(
            "message".to_string(),
            serde_json::Value::String(event.to_string()),
        );
    }
    value.to_string()
}

/// Writes one JSON object per event, stdout by default.
/// Write failures (a closed pipe downstream) are dropped; they never reach
/// the session.
pub struct JsonSink<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
}

impl JsonSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl<W: Write + Send> EventSink for JsonSink<W> {
    fn emit(&self, event: LogEvent) {
        let line = render_json(&event);
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", line).and_then(|_| out.flush());
        }
    }
}

/// Collects events in memory for assertions.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn emit(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Output whose reader has gone away
#[cfg(test)]
pub(crate) struct ClosedPipe;

#[cfg(test)]
impl Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader closed"))
    }
}
