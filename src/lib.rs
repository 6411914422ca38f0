// src/lib.rs
//
// ChronoSense: serial data logger.
// Finds a microcontroller on a serial port, reads comma-separated records and
// writes them to timestamped CSV files, migrating the file when the number of
// values per record changes.

#[macro_use]
mod logging;

pub mod cli;
pub mod datalog;
pub mod error;
pub mod events;
pub mod io;
pub mod settings;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use cli::{Cli, EventFormat};
use datalog::SessionLogger;
use error::{ConnectError, SessionError};
use events::{EventSink, JsonSink, LogEvent, TextSink};
use io::serial::{list_serial_ports, ConnectionManager, PortResolver, SystemPorts};
use settings::LoggerSettings;

/// Parse the command line, run one logging session and map the outcome to
/// an exit status: 0 for a normal stop or interrupt, 1 for start-up failure.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = run_cli(cli);
    logging::stop_file_logging();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tlog_error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> Result<(), String> {
    if let Some(path) = &cli.log_file {
        logging::init_file_logging(path)?;
    }

    let mut settings = settings::load_settings(cli.config.as_deref())?;
    cli.apply_to(&mut settings);
    settings.validate()?;

    if cli.list_ports {
        return print_ports(&settings);
    }

    tlog!("=== ChronoSense - Microbit Data Logger ===");
    settings::initialize_log_dir(&settings)?;

    let sink: Arc<dyn EventSink> = match cli.events {
        EventFormat::Text => Arc::new(TextSink),
        EventFormat::Json => Arc::new(JsonSink::stdout()),
    };

    let manager = ConnectionManager::system(&settings.port_signatures)
        .with_retry_delay(settings.retry_delay());
    let session = SessionLogger::new(settings.session_config(), manager, sink.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    runtime.block_on(supervise(session, sink))
}

/// Run the blocking session off the async runtime and turn an interrupt into
/// a stop request. The session task is always awaited so its cleanup runs.
async fn supervise(mut session: SessionLogger, sink: Arc<dyn EventSink>) -> Result<(), String> {
    let stop = session.stop_handle();
    let mut task = tokio::task::spawn_blocking(move || session.start());

    let joined = tokio::select! {
        joined = &mut task => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    sink.emit(LogEvent::ShutdownRequested);
                    stop.stop();
                }
                Err(e) => tlog_error!("[signal] Failed to listen for interrupt: {}", e),
            }
            task.await
        }
    };

    match joined.map_err(|e| format!("Logging task failed: {}", e))? {
        Ok(_) => Ok(()),
        // Interrupted while still searching for the device
        Err(SessionError::Connect(ConnectError::Cancelled)) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

/// Print every visible port, marking those that match a device signature.
fn print_ports(settings: &LoggerSettings) -> Result<(), String> {
    let ports = list_serial_ports().map_err(|e| format!("Failed to list serial ports: {}", e))?;

    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    let resolver = PortResolver::new(Box::new(SystemPorts), &settings.port_signatures);
    for port in &ports {
        let marker = if resolver.matches(port) { "*" } else { " " };
        println!("{} {}", marker, port.summary());
    }
    Ok(())
}
