//! Connection workers: one task per kernel channel.
//!
//! - `connection` - dialing and the receive/send duties of one worker
//! - `pool` - launching workers, readiness, start signals and joining
//!
//! # Lifecycle
//!
//! ```text
//! launch ──▶ dial ──▶ ready ──▶ (start signal) ──▶ send ticks ──▶ close
//!              │                                       │
//!              └─▶ dial failed                 deadline / cancel
//! ```

pub mod connection;
pub mod pool;

use std::fmt;
use std::time::Duration;

use kbench_core::{Session, WorkerState};

use crate::config::{BenchmarkSettings, Credentials};

pub use connection::{dial, dial_within, ConnectionWorker, DialError};
pub use pool::{ReadyCounts, StartHandle, WorkerPool};

/// Per-run settings shared by every worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay between ticks
    pub tick: Duration,
    /// Send budget, measured from the first tick
    pub run_budget: Duration,
    /// Upper bound on the channel handshake
    pub dial_timeout: Duration,
    /// How long to keep reading after sending our close frame
    pub close_grace: Duration,
    pub code: String,
    pub username: String,
    pub credentials: Credentials,
}

impl WorkerConfig {
    pub fn from_settings(settings: &BenchmarkSettings) -> Self {
        Self {
            tick: settings.tick,
            run_budget: settings.timing.run_budget,
            dial_timeout: settings.timing.dial_timeout,
            close_grace: settings.timing.close_grace,
            code: settings.code.clone(),
            username: settings.username.clone(),
            credentials: settings.credentials.clone(),
        }
    }
}

/// Outcome of the dial, reported once to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Connected,
    DialFailed,
}

/// Why a worker reached `closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Run budget elapsed
    Deadline,
    /// Shared cancellation observed
    Cancelled,
    /// Start signal was withdrawn before it fired
    NeverStarted,
    /// Peer ended the stream before we finished sending
    PeerClosed,
    /// Read failure
    ConnectionLost(String),
    /// The channel could not be dialed
    DialFailed(String),
}

impl ExitReason {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::DialFailed(_))
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => f.write_str("deadline"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::NeverStarted => f.write_str("never started"),
            Self::PeerClosed => f.write_str("peer closed"),
            Self::ConnectionLost(e) => write!(f, "connection lost: {e}"),
            Self::DialFailed(e) => write!(f, "dial failed: {e}"),
        }
    }
}

/// What one worker did over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub session: Session,
    pub final_state: WorkerState,
    pub exit: ExitReason,
    /// True if the worker ever moved to `sending`
    pub entered_sending: bool,
    /// Messages this worker sent successfully
    pub sent: u64,
    /// Data frames this worker received
    pub received: u64,
}

impl WorkerReport {
    pub(crate) fn dial_failed(session: Session, exit: ExitReason) -> Self {
        Self {
            session,
            final_state: WorkerState::Closed,
            exit,
            entered_sending: false,
            sent: 0,
            received: 0,
        }
    }
}

impl fmt::Display for WorkerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}), sent {}, received {}",
            self.session.name, self.final_state, self.exit, self.sent, self.received
        )
    }
}
