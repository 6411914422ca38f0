// src/io/mod.rs
//
// Device I/O for the logger: serial discovery, connection and line framing,
// plus the cancellation handle shared between the session loop and whoever
// asks it to stop (signal handler, embedding code, tests).

pub mod serial;

use serde::Serialize;
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// Granularity of cancellable sleeps
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// Stop Handle
// ============================================================================

/// Cloneable cancellation flag observed by the session loop between iterations.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request stop. Takes effect at the next loop boundary.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if stop is requested.
    /// Returns true if stop was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(std::cmp::min(STOP_POLL_INTERVAL, deadline - now));
        }
    }
}

// ============================================================================
// Stop Reason
// ============================================================================

/// Why a logging session left the Logging state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit stop() or interrupt signal
    Requested,
    /// The port reported end of stream
    Disconnected,
    /// Unrecoverable read error
    ReadError { error: String },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => write!(f, "stopped by user"),
            StopReason::Disconnected => write!(f, "device disconnected"),
            StopReason::ReadError { error } => write!(f, "read error: {}", error),
        }
    }
}
