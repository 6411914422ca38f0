// src/datalog/session.rs
//
// Session logger: Idle -> Connecting -> Logging -> Stopped.
// One thread owns the connection, schema and log file. The loop blocks only on
// the bounded-timeout read and checks the stop handle between iterations, so a
// record that has been framed is always written before the session stops.

use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::log_file::{format_timestamp, LogFile, LogNaming};
use super::migrate::{migrate, MigrationOutcome};
use super::schema::{split_record, Classification, Schema, SchemaTracker};
use crate::error::{MigrationError, SessionError};
use crate::events::{EventSink, LogEvent};
use crate::io::serial::framer::DEFAULT_MAX_LINE_LENGTH;
use crate::io::serial::{Connection, ConnectionManager, LineFramer, SerialConfig};
use crate::io::{StopHandle, StopReason};

/// Bytes requested per read
const READ_CHUNK: usize = 256;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_PROGRESS_EVERY: u64 = 10;

// ============================================================================
// Types and Configuration
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Logging,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Explicit endpoint; discovery is used when absent
    pub port: Option<String>,
    pub serial: SerialConfig,
    pub naming: LogNaming,
    pub max_attempts: u32,
    pub max_line_length: usize,
    /// Emit a progress event every N records (0 disables)
    pub progress_every: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: None,
            serial: SerialConfig::default(),
            naming: LogNaming::new("logs", "microbit_data"),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

/// Result of a session that got as far as Logging
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub records: u64,
    pub log_path: Option<PathBuf>,
    pub reason: StopReason,
}

// ============================================================================
// Session Logger
// ============================================================================

pub struct SessionLogger {
    config: SessionConfig,
    manager: ConnectionManager,
    sink: Arc<dyn EventSink>,
    stop: StopHandle,
    state: SessionState,
    connection: Option<Connection>,
    log: Option<LogFile>,
    tracker: SchemaTracker,
    framer: LineFramer,
    records: u64,
}

impl SessionLogger {
    pub fn new(config: SessionConfig, manager: ConnectionManager, sink: Arc<dyn EventSink>) -> Self {
        let framer = LineFramer::new(config.max_line_length);
        Self {
            config,
            manager,
            sink,
            stop: StopHandle::new(),
            state: SessionState::Idle,
            connection: None,
            log: None,
            tracker: SchemaTracker::new(),
            framer,
            records: 0,
        }
    }

    /// Handle for requesting stop from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn record_count(&self) -> u64 {
        self.records
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(LogFile::path)
    }

    /// Connect, create the log file and log until stopped.
    ///
    /// Returns `Err` only for start-up failures; once logging has begun every
    /// exit is reported through the summary's stop reason.
    pub fn start(&mut self) -> Result<SessionSummary, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::NotIdle);
        }
        self.state = SessionState::Connecting;

        let connection = match self.manager.connect(
            self.config.port.as_deref(),
            &self.config.serial,
            self.config.max_attempts,
            self.sink.as_ref(),
            &self.stop,
        ) {
            Ok(connection) => connection,
            Err(e) => {
                self.state = SessionState::Stopped;
                return Err(e.into());
            }
        };
        self.connection = Some(connection);

        match LogFile::create(&self.config.naming, self.tracker.current()) {
            Ok(log) => {
                self.sink.emit(LogEvent::LogFileCreated {
                    path: log.path().to_path_buf(),
                });
                self.log = Some(log);
            }
            Err(e) => {
                self.sink.emit(LogEvent::LogFileCreateFailed {
                    error: e.to_string(),
                });
                self.shutdown();
                return Err(e.into());
            }
        }

        self.state = SessionState::Logging;
        let reason = self.run();
        let log_path = self.shutdown();

        self.sink.emit(LogEvent::SessionStopped {
            reason: reason.clone(),
            records: self.records,
        });

        Ok(SessionSummary {
            records: self.records,
            log_path,
            reason,
        })
    }

    fn run(&mut self) -> StopReason {
        if let Some(connection) = self.connection.as_mut() {
            if let Err(e) = connection.clear_input() {
                tlog_error!("[session] Could not clear input buffer: {}", e);
            }
        }
        self.sink.emit(LogEvent::WaitingForData);

        let mut buf = [0u8; READ_CHUNK];
        loop {
            if self.stop.is_stopped() {
                return StopReason::Requested;
            }

            let read = match self.connection.as_mut() {
                Some(connection) => connection.read(&mut buf),
                None => return StopReason::Disconnected,
            };

            match read {
                // End of stream: the device went away
                Ok(0) => return StopReason::Disconnected,
                Ok(n) => self.ingest(&buf[..n]),
                Err(ref e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    let error = e.to_string();
                    self.sink.emit(LogEvent::ReadError {
                        error: error.clone(),
                    });
                    return StopReason::ReadError { error };
                }
            }
        }
    }

    fn ingest(&mut self, chunk: &[u8]) {
        let dropped = self.framer.push(chunk);
        if dropped > 0 {
            self.sink.emit(LogEvent::RecordError {
                error: format!(
                    "discarded {} bytes without a line terminator (limit {})",
                    dropped, self.config.max_line_length
                ),
            });
        }

        while let Some(line) = self.framer.next_line() {
            self.process_line(&line);
        }
    }

    fn process_line(&mut self, line: &str) {
        let values = split_record(line);

        if let Classification::Changed(schema) = self.tracker.classify(&values) {
            self.apply_schema(&schema);
        }

        let Some(log) = self.log.as_mut() else {
            return;
        };

        let timestamp = format_timestamp(&Local::now());
        match log.append_record(&timestamp, &values) {
            Ok(()) => {
                self.records += 1;
                let every = self.config.progress_every;
                if every > 0 && self.records % every == 0 {
                    self.sink.emit(LogEvent::Progress {
                        count: self.records,
                        last_values: values,
                    });
                }
            }
            Err(e) => self.sink.emit(LogEvent::RecordError {
                error: e.to_string(),
            }),
        }
    }

    /// Migrate the log to `schema`. Failures are reported and logging carries
    /// on in whichever file is still active.
    fn apply_schema(&mut self, schema: &Schema) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        let fields = schema.field_names();

        // Announce only changes that will actually move rows
        if log.data_rows() > 0 && log.schema() != schema {
            self.sink.emit(LogEvent::SchemaChanged {
                fields: fields.clone(),
            });
        }

        match migrate(log, schema, &self.config.naming) {
            Ok(MigrationOutcome::Unchanged) => {}
            Ok(MigrationOutcome::HeaderRewritten) => self.sink.emit(LogEvent::HeaderWritten {
                path: log.path().to_path_buf(),
                fields,
            }),
            Ok(MigrationOutcome::Migrated { from, to, rows }) => {
                self.sink.emit(LogEvent::Migrated {
                    from,
                    to,
                    rows,
                    fields,
                })
            }
            // Rows were moved and the new file is active; only cleanup failed
            Err(MigrationError::RemoveOld { path, source }) => {
                self.sink.emit(LogEvent::OldLogNotRemoved {
                    path,
                    error: source.to_string(),
                })
            }
            Err(e) => self.sink.emit(LogEvent::MigrationFailed {
                error: e.to_string(),
            }),
        }
    }

    /// Close the log and release the port. Safe to call more than once.
    fn shutdown(&mut self) -> Option<PathBuf> {
        let mut saved = None;

        if let Some(log) = self.log.take() {
            let path = log.path().to_path_buf();
            match log.close() {
                Ok(path) => {
                    self.sink.emit(LogEvent::LogFileSaved {
                        path: path.clone(),
                        records: self.records,
                    });
                    saved = Some(path);
                }
                Err(e) => {
                    self.sink.emit(LogEvent::RecordError {
                        error: e.to_string(),
                    });
                    saved = Some(path);
                }
            }
        }

        if let Some(mut connection) = self.connection.take() {
            let port = connection.endpoint().port.clone();
            if connection.disconnect() {
                self.sink.emit(LogEvent::Disconnected { port });
            }
        }

        self.state = SessionState::Stopped;
        saved
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        if self.log.is_some() || self.connection.is_some() {
            self.shutdown();
        }
    }
}
