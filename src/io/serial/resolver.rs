// src/io/serial/resolver.rs
//
// Port resolution: pick the serial endpoint to log from.
// An explicit port is used as-is; otherwise the OS device list is scanned for
// the first device whose description carries a known microcontroller token.
// No retry here; the connection manager owns retry policy.

use super::utils::{list_serial_ports, SerialPortInfo};

/// Tokens matched (case-insensitively) against port descriptions by default
pub const DEFAULT_PORT_SIGNATURES: &[&str] = &["mbed", "microbit", "micro:bit"];

/// Source of the visible serial device list.
pub trait PortSource: Send {
    fn available_ports(&self) -> Result<Vec<SerialPortInfo>, serialport::Error>;
}

/// The operating system's device list
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemPorts;

impl PortSource for SystemPorts {
    fn available_ports(&self) -> Result<Vec<SerialPortInfo>, serialport::Error> {
        list_serial_ports()
    }
}

pub struct PortResolver {
    source: Box<dyn PortSource>,
    /// Lowercased signature tokens
    signatures: Vec<String>,
}

impl PortResolver {
    pub fn new(source: Box<dyn PortSource>, signatures: &[String]) -> Self {
        Self {
            source,
            signatures: signatures
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Whether a port's description contains any signature token
    pub fn matches(&self, port: &SerialPortInfo) -> bool {
        let description = port.description().to_lowercase();
        self.signatures
            .iter()
            .any(|token| description.contains(token.as_str()))
    }

    /// Return `explicit` unchanged if given, else the first matching device.
    /// An enumeration failure counts as "not found".
    pub fn resolve(&self, explicit: Option<&str>) -> Option<String> {
        if let Some(port) = explicit {
            return Some(port.to_string());
        }

        let ports = match self.source.available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                tlog_error!("[resolver] Failed to enumerate ports: {}", e);
                return None;
            }
        };

        ports
            .into_iter()
            .find(|p| self.matches(p))
            .map(|p| p.port_name)
    }

    /// Every visible port, for diagnostics. Empty if enumeration fails.
    pub fn visible_ports(&self) -> Vec<SerialPortInfo> {
        self.source.available_ports().unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

/// Fixed device list that counts how often it was scanned
#[cfg(test)]
pub(crate) struct FakePorts {
    pub ports: Vec<SerialPortInfo>,
    pub scans: std::sync::Arc<std::sync::atomic::AtomicU32>,
}

#[cfg(test)]
impl FakePorts {
    pub fn new(ports: Vec<SerialPortInfo>) -> Self {
        Self {
            ports,
            scans: Default::default(),
        }
    }
}

#[cfg(test)]
impl PortSource for FakePorts {
    fn available_ports(&self) -> Result<Vec<SerialPortInfo>, serialport::Error> {
        self.scans
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.ports.clone())
    }
}
