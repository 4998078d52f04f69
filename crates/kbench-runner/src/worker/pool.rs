//! Collection of running connection workers.
//!
//! The pool owns every worker's task handle, start signal and readiness
//! receiver. The orchestrator launches workers into it, waits for them to
//! dial, fires the start signals and finally joins them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kbench_core::Session;

use super::{ConnectionWorker, Readiness, WorkerConfig, WorkerReport};
use crate::metrics::MetricsHandle;

/// Start signal of one worker.
///
/// Firing is idempotent: the worker runs one send loop no matter how often
/// the signal fires.
#[derive(Debug)]
pub struct StartHandle {
    tx: watch::Sender<bool>,
}

impl StartHandle {
    /// Fires the signal. Returns true if this was the first fire.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }
}

/// Readiness of the workers launched so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadyCounts {
    pub connected: usize,
    pub failed: usize,
    /// Workers that had not reported when the wait ended
    pub pending: usize,
}

/// Running connection workers of one benchmark run.
pub struct WorkerPool {
    config: Arc<WorkerConfig>,
    metrics: MetricsHandle,
    cancel: CancellationToken,
    tasks: JoinSet<WorkerReport>,
    starts: Vec<StartHandle>,
    ready: Vec<oneshot::Receiver<Readiness>>,
}

impl WorkerPool {
    pub fn new(config: Arc<WorkerConfig>, metrics: MetricsHandle, cancel: CancellationToken) -> Self {
        Self {
            config,
            metrics,
            cancel,
            tasks: JoinSet::new(),
            starts: Vec::new(),
            ready: Vec::new(),
        }
    }

    /// Spawns a worker for `session` on the channel at `url`.
    pub fn launch(&mut self, session: Session, url: String) {
        let (start_tx, start_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();
        let index = session.index;

        let worker = ConnectionWorker::new(
            session,
            url,
            Arc::clone(&self.config),
            Arc::clone(&self.metrics),
            start_rx,
            ready_tx,
            self.cancel.clone(),
        );
        self.tasks.spawn(worker.run());
        self.starts.push(StartHandle { tx: start_tx });
        self.ready.push(ready_rx);

        debug!(index, workers = self.starts.len(), "Worker launched");
    }

    /// Number of workers launched.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Waits until every launched worker has reported its dial outcome, or
    /// until `bound` elapses.
    ///
    /// Each worker's readiness is consumed once; a second call only waits
    /// on workers launched since the first.
    pub async fn wait_ready(&mut self, bound: Duration) -> ReadyCounts {
        let deadline = Instant::now() + bound;
        let mut counts = ReadyCounts::default();

        for rx in self.ready.drain(..) {
            match timeout_at(deadline, rx).await {
                Ok(Ok(Readiness::Connected)) => counts.connected += 1,
                // A dropped sender means the worker ended before dialing.
                Ok(Ok(Readiness::DialFailed)) | Ok(Err(_)) => counts.failed += 1,
                Err(_) => counts.pending += 1,
            }
        }

        if counts.pending > 0 {
            warn!(
                connected = counts.connected,
                failed = counts.failed,
                pending = counts.pending,
                bound_ms = bound.as_millis() as u64,
                "Warm-up bound reached before all workers were ready"
            );
        } else {
            info!(
                connected = counts.connected,
                failed = counts.failed,
                "All workers reported ready"
            );
        }

        counts
    }

    /// Fires every worker's start signal. Returns how many fired for the
    /// first time.
    pub fn start_all(&self) -> usize {
        let fired = self.starts.iter().filter(|handle| handle.fire()).count();
        info!(fired, workers = self.starts.len(), "Start signal sent");
        fired
    }

    /// Waits for every worker to finish. Reports are ordered by session
    /// index.
    ///
    /// Start signals that never fired are withdrawn first, so idle workers
    /// close instead of waiting forever.
    pub async fn join_all(mut self) -> Vec<WorkerReport> {
        self.starts.clear();
        self.ready.clear();

        let mut reports = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "Worker task failed"),
            }
        }

        reports.sort_by_key(|report| report.session.index);
        reports
    }
}
