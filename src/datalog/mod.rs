// src/datalog/mod.rs
//
// CSV data logging: schema tracking, the on-disk log, migration between
// schemas, and the session loop that drives them from a serial connection.

pub mod log_file;
pub mod migrate;
pub mod schema;
pub mod session;

pub use log_file::{format_timestamp, read_data_rows, LogFile, LogNaming};
pub use migrate::{migrate, MigrationOutcome};
pub use schema::{split_record, Classification, Schema, SchemaTracker};
pub use session::{SessionConfig, SessionLogger, SessionState, SessionSummary};
