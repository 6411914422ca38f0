// src/io/serial/connection.rs
//
// Connection manager: retry-bounded discovery, a single physical open, and
// idempotent teardown. Once a port is known there is no retry; a port that
// resolved but will not open is a different problem from one not present yet.

use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read};
use std::time::Duration;

use super::resolver::{PortResolver, PortSource, SystemPorts};
use super::utils::{self, Parity};
use crate::error::ConnectError;
use crate::events::{EventSink, LogEvent};
use crate::io::StopHandle;

/// Backoff between discovery attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Read timeout applied on open; bounds how long the session loop can block
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

// ============================================================================
// Types and Configuration
// ============================================================================

/// Line settings applied when the port is opened
#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// The serial device a session is bound to. Fixed once connect succeeds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub port: String,
    pub baud_rate: u32,
}

/// Byte source behind a Connection
pub trait SerialLink: Read + Send {
    /// Discard anything the OS has buffered but we have not read yet
    fn clear_input(&mut self) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Performs the physical open
pub trait Opener: Send {
    fn open(&self, port: &str, config: &SerialConfig)
        -> Result<Box<dyn SerialLink>, serialport::Error>;
}

/// Opens real devices through the serialport crate
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemOpener;

impl Opener for SystemOpener {
    fn open(
        &self,
        port: &str,
        config: &SerialConfig,
    ) -> Result<Box<dyn SerialLink>, serialport::Error> {
        let handle = serialport::new(port, config.baud_rate)
            .data_bits(utils::to_serialport_data_bits(config.data_bits))
            .stop_bits(utils::to_serialport_stop_bits(config.stop_bits))
            .parity(utils::to_serialport_parity(&config.parity))
            .timeout(config.read_timeout)
            .open()?;
        Ok(Box::new(handle))
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Live handle to an endpoint. Closed on disconnect() or drop.
pub struct Connection {
    endpoint: Endpoint,
    link: Option<Box<dyn SerialLink>>,
}

impl Connection {
    pub fn new(endpoint: Endpoint, link: Box<dyn SerialLink>) -> Self {
        Self {
            endpoint,
            link: Some(link),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    pub fn clear_input(&mut self) -> io::Result<()> {
        match self.link.as_mut() {
            Some(link) => link.clear_input(),
            None => Err(not_connected()),
        }
    }

    /// Read whatever is available, blocking at most for the read timeout.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.link.as_mut() {
            Some(link) => link.read(buf),
            None => Err(not_connected()),
        }
    }

    /// Close the handle. Idempotent; returns true only if a handle was closed.
    pub fn disconnect(&mut self) -> bool {
        self.link.take().is_some()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "serial port is not open")
}

// ============================================================================
// Connection Manager
// ============================================================================

pub struct ConnectionManager {
    resolver: PortResolver,
    opener: Box<dyn Opener>,
    retry_delay: Duration,
}

impl ConnectionManager {
    pub fn new(source: Box<dyn PortSource>, opener: Box<dyn Opener>, signatures: &[String]) -> Self {
        Self {
            resolver: PortResolver::new(source, signatures),
            opener,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Manager bound to the real OS device list and serial driver
    pub fn system(signatures: &[String]) -> Self {
        Self::new(Box::new(SystemPorts), Box::new(SystemOpener), signatures)
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn resolver(&self) -> &PortResolver {
        &self.resolver
    }

    /// Resolve (with retry) when no endpoint is given, then open exactly once.
    pub fn connect(
        &self,
        endpoint: Option<&str>,
        config: &SerialConfig,
        max_attempts: u32,
        sink: &dyn EventSink,
        stop: &StopHandle,
    ) -> Result<Connection, ConnectError> {
        let port = match endpoint {
            Some(port) => port.to_string(),
            None => self.discover(max_attempts, sink, stop)?,
        };

        sink.emit(LogEvent::Connecting {
            port: port.clone(),
            baud_rate: config.baud_rate,
        });

        let link = match self.opener.open(&port, config) {
            Ok(link) => link,
            Err(source) => {
                sink.emit(LogEvent::ConnectFailed {
                    port: port.clone(),
                    error: source.to_string(),
                });
                return Err(ConnectError::Open { port, source });
            }
        };

        sink.emit(LogEvent::Connected { port: port.clone() });

        Ok(Connection::new(
            Endpoint {
                port,
                baud_rate: config.baud_rate,
            },
            link,
        ))
    }

    /// Scan up to `max_attempts` times (at least once), sleeping between scans.
    fn discover(
        &self,
        max_attempts: u32,
        sink: &dyn EventSink,
        stop: &StopHandle,
    ) -> Result<String, ConnectError> {
        let attempts = max_attempts.max(1);

        for attempt in 1..=attempts {
            if stop.is_stopped() {
                return Err(ConnectError::Cancelled);
            }

            sink.emit(LogEvent::PortSearch {
                attempt,
                max_attempts: attempts,
            });

            if let Some(port) = self.resolver.resolve(None) {
                sink.emit(LogEvent::PortFound { port: port.clone() });
                return Ok(port);
            }

            if attempt < attempts {
                sink.emit(LogEvent::PortSearchRetry {
                    delay_ms: self.retry_delay.as_millis() as u64,
                });
                if stop.sleep(self.retry_delay) {
                    return Err(ConnectError::Cancelled);
                }
            }
        }

        let visible_ports: Vec<String> = self
            .resolver
            .visible_ports()
            .iter()
            .map(|p| p.summary())
            .collect();

        sink.emit(LogEvent::PortNotFound {
            attempts,
            visible_ports: visible_ports.clone(),
        });

        Err(ConnectError::Exhausted {
            attempts,
            visible_ports,
        })
    }
}

// ============================================================================
// Test Doubles
// ============================================================================


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::events::RecordingSink;
    use crate::io::serial::resolver::FakePorts;
    use crate::io::serial::utils::usb_port;
    use std::sync::atomic::Ordering;

    fn signatures() -> Vec<String> {
        vec!["microbit".to_string()]
    }

    #[test]
    fn test_retry_bound_exhausts_after_max_attempts() {
        let source = FakePorts::new(vec![usb_port("/dev/ttyUSB0", "FT232R", "FTDI")]);
        let opener = FakeOpener::failing();
        let opens = opener.opens.clone();
        let manager = ConnectionManager::new(Box::new(source), Box::new(opener), &signatures())
            .with_retry_delay(Duration::from_millis(1));
        let sink = RecordingSink::default();

        let result = manager.connect(None, &SerialConfig::default(), 3, &sink, &StopHandle::new());

        match result {
            Err(ConnectError::Exhausted {
                attempts,
                visible_ports,
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(visible_ports, vec!["/dev/ttyUSB0: FT232R - FTDI".to_string()]);
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connect should fail"),
        }

        let events = sink.events();
        let searches = events
            .iter()
            .filter(|e| matches!(e, LogEvent::PortSearch { .. }))
            .count();
        let retries = events
            .iter()
            .filter(|e| matches!(e, LogEvent::PortSearchRetry { .. }))
            .count();
        assert_eq!(searches, 3);
        // No backoff after the final attempt
        assert_eq!(retries, 2);
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_exhaustion_with_no_ports_visible() {
        let manager = ConnectionManager::new(
            Box::new(FakePorts::new(vec![])),
            Box::new(FakeOpener::failing()),
            &signatures(),
        )
        .with_retry_delay(Duration::from_millis(1));
        let sink = RecordingSink::default();

        let err = manager
            .connect(None, &SerialConfig::default(), 1, &sink, &StopHandle::new())
            .err()
            .unwrap();
        assert!(err.to_string().contains("no serial ports visible"));
        assert!(sink.events().contains(&LogEvent::PortNotFound {
            attempts: 1,
            visible_ports: vec![]
        }));
    }

    #[test]
    fn test_zero_attempts_still_scans_once() {
        let source = FakePorts::new(vec![]);
        let scans = source.scans.clone();
        let manager = ConnectionManager::new(Box::new(source), Box::new(FakeOpener::failing()), &signatures());

        let result = manager.connect(
            None,
            &SerialConfig::default(),
            0,
            &RecordingSink::default(),
            &StopHandle::new(),
        );
        assert!(matches!(result, Err(ConnectError::Exhausted { attempts: 1, .. })));
        // One resolve scan plus one diagnostic listing
        assert_eq!(scans.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_discovered_port_is_opened() {
        let source = FakePorts::new(vec![
            usb_port("/dev/ttyUSB0", "FT232R", "FTDI"),
            usb_port("/dev/ttyACM0", "BBC microbit CMSIS-DAP", "ARM"),
        ]);
        let manager = ConnectionManager::new(
            Box::new(source),
            Box::new(FakeOpener::with_port(ScriptedPort::chunks(&[]))),
            &signatures(),
        );
        let sink = RecordingSink::default();

        let connection = manager
            .connect(None, &SerialConfig::default(), 5, &sink, &StopHandle::new())
            .unwrap();

        assert!(connection.is_open());
        assert_eq!(
            connection.endpoint(),
            &Endpoint {
                port: "/dev/ttyACM0".to_string(),
                baud_rate: 115_200
            }
        );
        assert!(sink.events().contains(&LogEvent::PortFound {
            port: "/dev/ttyACM0".to_string()
        }));
    }

    #[test]
    fn test_open_failure_is_not_retried() {
        let opener = FakeOpener::failing();
        let opens = opener.opens.clone();
        let manager = ConnectionManager::new(Box::new(FakePorts::new(vec![])), Box::new(opener), &signatures());
        let sink = RecordingSink::default();

        let result = manager.connect(
            Some("/dev/ttyACM9"),
            &SerialConfig::default(),
            5,
            &sink,
            &StopHandle::new(),
        );

        match result {
            Err(ConnectError::Open { port, .. }) => assert_eq!(port, "/dev/ttyACM9"),
            _ => panic!("expected open failure"),
        }
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, LogEvent::ConnectFailed { .. })));
    }

    #[test]
    fn test_stop_cancels_discovery() {
        let manager = ConnectionManager::new(
            Box::new(FakePorts::new(vec![])),
            Box::new(FakeOpener::failing()),
            &signatures(),
        );
        let stop = StopHandle::new();
        stop.stop();

        let result = manager.connect(
            None,
            &SerialConfig::default(),
            5,
            &RecordingSink::default(),
            &stop,
        );
        assert!(matches!(result, Err(ConnectError::Cancelled)));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let port = ScriptedPort::chunks(&["1,2\n"]);
        let closed = port.closed.clone();
        let mut connection = Connection::new(
            Endpoint {
                port: "/dev/ttyACM0".to_string(),
                baud_rate: 9600,
            },
            Box::new(port),
        );

        assert!(connection.disconnect());
        assert!(closed.load(Ordering::SeqCst));
        assert!(!connection.disconnect());
        assert!(!connection.is_open());

        let mut buf = [0u8; 8];
        let err = connection.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
