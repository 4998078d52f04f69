//! Session identity and connection worker lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of a kernel process, assigned by the backend.
///
/// Wraps the backend's string verbatim (usually a UUID such as
/// "1b0f4a8e-3c1d-4f3e-9a3e-8d5c2f6b7a10"). Never generated locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KernelId(String);

impl KernelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened display form (first 8 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for KernelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for KernelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a notebook session, assigned by the backend.
///
/// Also used as the `session` field of every outbound message header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened display form (first 8 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Session
// ============================================================================

/// One simulated notebook user: a backend-assigned (kernel, session) pair.
///
/// Created once the session-creation call succeeds and never mutated
/// afterwards. The display name is derived from the ordinal index of the
/// creation request, so it is unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub kernel_id: KernelId,
    pub session_id: SessionId,
    pub name: String,
    pub index: usize,
}

impl Session {
    pub fn new(index: usize, kernel_id: KernelId, session_id: SessionId) -> Self {
        Self {
            kernel_id,
            session_id,
            name: Self::display_name(index),
            index,
        }
    }

    /// Notebook name used for the session with the given ordinal index.
    ///
    /// ```
    /// use kbench_core::Session;
    /// assert_eq!(Session::display_name(3), "Untitled-3.ipynb");
    /// ```
    #[must_use]
    pub fn display_name(index: usize) -> String {
        format!("Untitled-{index}.ipynb")
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (kernel {}, session {})",
            self.name,
            self.kernel_id.short(),
            self.session_id.short()
        )
    }
}

// ============================================================================
// Worker State Machine
// ============================================================================

/// Lifecycle of a connection worker.
///
/// ```text
/// connecting ──▶ idle ──▶ sending ──▶ closed
///      │           │                    ▲
///      └───────────┴────────────────────┘
/// ```
///
/// A dial failure goes straight from `Connecting` to `Closed`; cancellation
/// or a read failure closes an `Idle` or `Sending` worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Connecting,
    Idle,
    Sending,
    Closed,
}

impl WorkerState {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Closed => "closed",
        }
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Idle)
                | (Self::Connecting, Self::Closed)
                | (Self::Idle, Self::Sending)
                | (Self::Idle, Self::Closed)
                | (Self::Sending, Self::Closed)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
