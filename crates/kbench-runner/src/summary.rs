//! End-of-run summary.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use kbench_core::{ResourceSummary, Target};

use crate::metrics::WindowCounts;
use crate::sampler::SamplerExit;
use crate::worker::{ExitReason, WorkerReport};

/// Everything a finished run reports.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub target: Target,
    pub sessions_requested: usize,
    /// Sessions whose creation call failed
    pub open_failures: usize,
    /// One report per launched worker, ordered by session index
    pub workers: Vec<WorkerReport>,
    /// Sent/received totals after the final drain
    pub totals: WindowCounts,
    pub resources: ResourceSummary,
    /// None if the sampler task panicked
    pub sampler_exit: Option<SamplerExit>,
    pub output: PathBuf,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl RunSummary {
    /// Sessions created and handed to a worker.
    pub fn sessions_opened(&self) -> usize {
        self.workers.len()
    }

    /// Workers that reached `sending`.
    pub fn workers_started(&self) -> usize {
        self.workers.iter().filter(|w| w.entered_sending).count()
    }

    pub fn dial_failures(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| matches!(w.exit, ExitReason::DialFailed(_)))
            .count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== kbench summary: {} ===", self.target)?;
        if self.cancelled {
            writeln!(f, "Run was cancelled before completion")?;
        }
        writeln!(
            f,
            "Sessions:           {} requested, {} opened, {} failed to open",
            self.sessions_requested,
            self.sessions_opened(),
            self.open_failures
        )?;
        writeln!(
            f,
            "Workers:            {} sending, {} failed to connect",
            self.workers_started(),
            self.dial_failures()
        )?;
        writeln!(f, "Messages sent:      {}", self.totals.sent)?;
        writeln!(f, "Messages received:  {}", self.totals.received)?;
        writeln!(f, "Elapsed:            {:.1}s", self.elapsed.as_secs_f64())?;

        match &self.sampler_exit {
            Some(SamplerExit::ProcessNotFound(e)) => {
                writeln!(f, "Resource sampling:  unavailable ({e})")?;
            }
            _ if self.resources.is_empty() => {
                writeln!(f, "Resource sampling:  no samples taken")?;
            }
            _ => writeln!(f, "{}", self.resources)?,
        }

        write!(f, "Results:            {}", self.output.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbench_core::{KernelId, Session, SessionId, WorkerState};

    use crate::inspector::InspectError;

    fn report(index: usize, exit: ExitReason, sent: u64) -> WorkerReport {
        WorkerReport {
            session: Session::new(index, KernelId::new("k"), SessionId::new("s")),
            final_state: WorkerState::Closed,
            entered_sending: sent > 0,
            exit,
            sent,
            received: sent,
        }
    }

    fn summary() -> RunSummary {
        RunSummary {
            target: Target::Zasper,
            sessions_requested: 3,
            open_failures: 1,
            workers: vec![
                report(0, ExitReason::Deadline, 10),
                report(2, ExitReason::DialFailed("refused".to_string()), 0),
            ],
            totals: WindowCounts {
                sent: 10,
                received: 10,
            },
            resources: ResourceSummary::default(),
            sampler_exit: Some(SamplerExit::Cancelled),
            output: PathBuf::from("data/100ms/out.json"),
            elapsed: Duration::from_millis(61_250),
            cancelled: false,
        }
    }

    #[test]
    fn test_counts() {
        let s = summary();
        assert_eq!(s.sessions_opened(), 2);
        assert_eq!(s.workers_started(), 1);
        assert_eq!(s.dial_failures(), 1);
    }

    #[test]
    fn test_display() {
        let text = summary().to_string();
        assert!(text.contains("=== kbench summary: zasper ==="));
        assert!(text.contains("3 requested, 2 opened, 1 failed to open"));
        assert!(text.contains("Messages sent:      10"));
        assert!(text.contains("no samples taken"));
        assert!(text.contains("Elapsed:            61.2s") || text.contains("Elapsed:            61.3s"));
        assert!(!text.contains("cancelled"));
    }

    #[test]
    fn test_display_missing_process() {
        let s = RunSummary {
            sampler_exit: Some(SamplerExit::ProcessNotFound(InspectError::ProcessNotFound {
                pid: 77,
            })),
            cancelled: true,
            ..summary()
        };
        let text = s.to_string();
        assert!(text.contains("unavailable (No process with PID 77)"));
        assert!(text.contains("Run was cancelled"));
    }
}
