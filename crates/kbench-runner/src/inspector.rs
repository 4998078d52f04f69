//! CPU and memory inspection of the backend process under test.
//!
//! The sampler talks to a [`ProcessInspector`] rather than to `sysinfo`
//! directly, so tests can drive it with scripted readings.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A vanished process is reported as an error, not a zero reading

use sysinfo::{Pid, System};
use thiserror::Error;

use kbench_core::sample::Sample;

/// One reading of the inspected process.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessUsage {
    /// CPU usage since the previous reading (percent of one core)
    pub cpu_percent: f64,

    /// Resident memory in bytes
    pub memory_bytes: u64,
}

impl ProcessUsage {
    #[must_use]
    pub fn memory_mb(&self) -> f64 {
        Sample::bytes_to_mb(self.memory_bytes)
    }
}

/// Errors raised while inspecting a process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InspectError {
    #[error("No process with PID {pid}")]
    ProcessNotFound { pid: u32 },

    #[error("Process {pid} is no longer running")]
    ProcessGone { pid: u32 },

    #[error("Failed to read usage for PID {pid}: {reason}")]
    Unavailable { pid: u32, reason: String },
}

/// Source of CPU and memory readings for a single process.
pub trait ProcessInspector: Send {
    /// PID being inspected.
    fn pid(&self) -> u32;

    /// Locates the process and establishes the CPU baseline.
    ///
    /// Called once before the first [`sample`](Self::sample).
    fn attach(&mut self) -> Result<(), InspectError>;

    /// CPU usage since the previous call and current resident memory.
    fn sample(&mut self) -> Result<ProcessUsage, InspectError>;
}

/// [`ProcessInspector`] backed by the `sysinfo` crate.
///
/// sysinfo computes CPU usage as the delta between two refreshes, so the
/// refresh in [`attach`](ProcessInspector::attach) is the baseline for the
/// first sample.
pub struct SysinfoInspector {
    system: System,
    pid: Pid,
}

impl SysinfoInspector {
    pub fn new(pid: u32) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(pid),
        }
    }

    fn refresh(&mut self) -> Option<ProcessUsage> {
        // refresh_all() is required for CPU calculation to work
        // (refreshing a single PID does not compute CPU correctly)
        self.system.refresh_all();

        self.system.process(self.pid).map(|p| ProcessUsage {
            cpu_percent: f64::from(p.cpu_usage()),
            memory_bytes: p.memory(),
        })
    }
}

impl ProcessInspector for SysinfoInspector {
    fn pid(&self) -> u32 {
        self.pid.as_u32()
    }

    fn attach(&mut self) -> Result<(), InspectError> {
        self.refresh()
            .map(|_| ())
            .ok_or(InspectError::ProcessNotFound { pid: self.pid() })
    }

    fn sample(&mut self) -> Result<ProcessUsage, InspectError> {
        let pid = self.pid();
        self.refresh().ok_or(InspectError::ProcessGone { pid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process;
    use std::time::{Duration, Instant};

    #[test]
    fn test_usage_memory_mb() {
        let usage = ProcessUsage {
            cpu_percent: 0.0,
            memory_bytes: 3 * 1024 * 1024,
        };
        assert_eq!(usage.memory_mb(), 3.0);
    }

    #[test]
    fn test_attach_to_current_process() {
        let mut inspector = SysinfoInspector::new(process::id());
        assert_eq!(inspector.pid(), process::id());
        assert!(inspector.attach().is_ok());

        let usage = inspector.sample().unwrap();
        assert!(usage.memory_bytes > 0);
        assert!(usage.cpu_percent >= 0.0);
    }

    #[test]
    fn test_attach_to_missing_process() {
        // PIDs are capped well below u32::MAX on every supported platform.
        let mut inspector = SysinfoInspector::new(u32::MAX - 1);
        assert_eq!(
            inspector.attach(),
            Err(InspectError::ProcessNotFound { pid: u32::MAX - 1 })
        );
        assert_eq!(
            inspector.sample(),
            Err(InspectError::ProcessGone { pid: u32::MAX - 1 })
        );
    }

    #[test]
    fn test_cpu_measurement() {
        let mut inspector = SysinfoInspector::new(process::id());
        inspector.attach().unwrap();

        // Busy-loop so the next reading has something to show.
        let start = Instant::now();
        let mut sum: u64 = 0;
        while start.elapsed() < Duration::from_millis(500) {
            for i in 0..100_000 {
                sum = sum.wrapping_add(i);
            }
        }
        std::hint::black_box(sum);

        let usage = inspector.sample().unwrap();
        assert!(
            usage.cpu_percent > 20.0,
            "Expected CPU > 20%, got {:.2}%",
            usage.cpu_percent
        );
    }
}
