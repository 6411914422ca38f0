// src/logging.rs
//
// Timestamped diagnostic logging for the logger process.
// Every line goes to stderr and, when file logging is enabled, to a log file.
// Format: `DD-MM-YYYY HH:MM:SS - LEVEL - message`.

use std::path::Path;
use std::sync::Mutex;

/// Global log file handle. When `Some`, `tlog!` writes to both stderr and this file.
pub(crate) static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Timestamp format used in front of every diagnostic line.
pub(crate) const LOG_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Timestamped logging macro (INFO level).
/// Prepends `DD-MM-YYYY HH:MM:SS - INFO - ` to every message written to stderr.
/// Also writes to the log file when file logging is enabled.
macro_rules! tlog {
    ($($arg:tt)*) => {{
        $crate::logging::write_line("INFO", format_args!($($arg)*));
    }};
}

/// Same as `tlog!` at ERROR level.
macro_rules! tlog_error {
    ($($arg:tt)*) => {{
        $crate::logging::write_line("ERROR", format_args!($($arg)*));
    }};
}

/// Initialise file logging to the given path.
/// The file is opened in append mode so repeated runs share one diagnostics file.
pub(crate) fn init_file_logging(log_path: &Path) -> Result<(), String> {
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create log directory: {}", e))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| format!("Failed to open log file: {}", e))?;

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    tlog!("[logging] File logging started: {}", log_path.display());

    Ok(())
}

/// Stop file logging and close the log file.
pub(crate) fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.is_some() {
            *guard = None;
            eprintln!(
                "{} - INFO - [logging] File logging stopped",
                chrono::Local::now().format(LOG_TIME_FORMAT)
            );
        }
    }
}

/// Write one already formatted line to stderr and the log file.
pub(crate) fn write_line(level: &str, message: std::fmt::Arguments<'_>) {
    use std::io::Write as _;
    let msg = format!(
        "{} - {} - {}",
        chrono::Local::now().format(LOG_TIME_FORMAT),
        level,
        message
    );
    let _ = writeln!(std::io::stderr().lock(), "{}", msg);
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(ref mut f) = *guard {
            let _ = writeln!(f, "{}", msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging_appends_formatted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diag").join("chronosense.log");

        init_file_logging(&path).unwrap();
        tlog!("hello {}", 42);
        tlog_error!("bad thing");
        stop_file_logging();

        // Not logged once the file handle is released
        tlog!("after stop");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(" - INFO - hello 42"));
        assert!(contents.contains(" - ERROR - bad thing"));
        assert!(!contents.contains("after stop"));

        // DD-MM-YYYY HH:MM:SS prefix
        let first = contents.lines().next().unwrap();
        assert_eq!(&first[2..3], "-");
        assert_eq!(&first[5..6], "-");
        assert_eq!(&first[10..11], " ");
    }
}
