// src/io/serial/mod.rs
//
// Serial side of the logger.
//
// Features:
// - Port discovery by description signature (resolver)
// - Retry-bounded connect and idempotent teardown (connection)
// - Newline framing with permissive decoding (framer)

pub mod connection;
pub mod framer;
pub mod resolver;
pub mod utils;

pub use connection::{
    Connection, ConnectionManager, Endpoint, Opener, SerialConfig, SerialLink, SystemOpener,
};
pub use framer::LineFramer;
pub use resolver::{PortResolver, PortSource, SystemPorts, DEFAULT_PORT_SIGNATURES};
pub use utils::{list_serial_ports, Parity, SerialPortInfo};
