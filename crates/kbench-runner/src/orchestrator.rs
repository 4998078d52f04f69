//! Sequencing of one benchmark run.
//!
//! 1. Start the resource sampler and the snapshot writer.
//! 2. Create N sessions one after another, `open_spacing` apart.
//! 3. Wait (bounded by `warmup`) until every worker has dialed.
//! 4. Fire every start signal, wait `settle`, then join the workers.
//! 5. Stop the background tasks, fold what is left in the registry into
//!    the totals and build the [`RunSummary`].
//!
//! The per-connection run budget decides when the run ends. Cancelling the
//! token passed to [`Orchestrator::run`] ends it early; the summary is still
//! produced.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kbench_core::ResourceSummary;

use crate::config::BenchmarkSettings;
use crate::history::SampleHistory;
use crate::inspector::ProcessInspector;
use crate::metrics::{MetricsRegistry, RunningTotals};
use crate::opener::{OpenError, SessionOpener};
use crate::sampler::{spawn_sampler, ResourceSampler};
use crate::snapshot::{spawn_snapshot_writer, SnapshotWriter};
use crate::summary::RunSummary;
use crate::worker::{WorkerConfig, WorkerPool};

/// Drives one benchmark run from session creation to summary.
pub struct Orchestrator {
    settings: BenchmarkSettings,
    inspector: Box<dyn ProcessInspector>,
}

impl Orchestrator {
    pub fn new(settings: BenchmarkSettings, inspector: Box<dyn ProcessInspector>) -> Self {
        Self {
            settings,
            inspector,
        }
    }

    /// Runs the benchmark to completion.
    ///
    /// Only fails if the HTTP client cannot be built; every per-session
    /// failure is logged and reflected in the summary.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunSummary, OpenError> {
        let Self {
            settings,
            inspector,
        } = self;
        let run_started = Instant::now();

        info!(
            backend = %settings.target,
            sessions = settings.sessions,
            tick_ms = settings.tick.as_millis() as u64,
            budget_secs = settings.timing.run_budget.as_secs(),
            sessions_url = %settings.endpoints.sessions_url,
            output = %settings.output.display(),
            "Benchmark starting"
        );

        let opener = SessionOpener::new(settings.endpoints.clone(), settings.credentials.clone())?;

        let metrics = MetricsRegistry::shared();
        let totals = Arc::new(RunningTotals::new());
        let history = SampleHistory::new();

        // Background tasks outlive the workers. The sampler stops before the
        // writer so the final snapshot holds every sample.
        let sampler_cancel = cancel.child_token();
        let writer_cancel = cancel.child_token();
        let sampler = spawn_sampler(
            ResourceSampler::new(
                inspector,
                Arc::clone(&metrics),
                Arc::clone(&totals),
                history.clone(),
                settings.timing.sample_interval,
            ),
            sampler_cancel.clone(),
        );
        let writer = spawn_snapshot_writer(
            SnapshotWriter::new(
                settings.output.clone(),
                history.clone(),
                settings.timing.snapshot_interval,
            ),
            writer_cancel.clone(),
        );

        let mut pool = WorkerPool::new(
            Arc::new(WorkerConfig::from_settings(&settings)),
            Arc::clone(&metrics),
            cancel.clone(),
        );

        let open_failures = open_sessions(&settings, &opener, &mut pool, &cancel).await;

        if !cancel.is_cancelled() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {}

                _ = pool.wait_ready(settings.timing.warmup) => {}
            }
        }

        if !cancel.is_cancelled() {
            pool.start_all();
            pause(settings.timing.settle, &cancel).await;
        }

        let workers = pool.join_all().await;
        info!(workers = workers.len(), "All workers closed");

        sampler_cancel.cancel();
        let sampler_exit = match sampler.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                error!(error = %e, "Sampler task failed");
                None
            }
        };
        writer_cancel.cancel();
        if let Err(e) = writer.await {
            error!(error = %e, "Snapshot writer task failed");
        }

        // The sampler has stopped; whatever it did not drain is folded here.
        let totals = totals.fold(metrics.drain());
        let resources = ResourceSummary::from_samples(&history.snapshot().await);

        let summary = RunSummary {
            target: settings.target,
            sessions_requested: settings.sessions,
            open_failures,
            workers,
            totals,
            resources,
            sampler_exit,
            output: settings.output,
            elapsed: run_started.elapsed(),
            cancelled: cancel.is_cancelled(),
        };

        info!(
            sent = summary.totals.sent,
            received = summary.totals.received,
            opened = summary.sessions_opened(),
            open_failures = summary.open_failures,
            "Benchmark finished"
        );

        Ok(summary)
    }
}

/// Creates every session in index order. Returns the number of failures.
async fn open_sessions(
    settings: &BenchmarkSettings,
    opener: &SessionOpener,
    pool: &mut WorkerPool,
    cancel: &CancellationToken,
) -> usize {
    let mut failures = 0;

    for index in 0..settings.sessions {
        if index > 0 {
            pause(settings.timing.open_spacing, cancel).await;
        }
        if cancel.is_cancelled() {
            warn!(
                opened = pool.len(),
                remaining = settings.sessions - index,
                "Cancelled while creating sessions"
            );
            break;
        }

        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = opener.open(index, pool) => result,
        };

        match result {
            Ok(status) => {
                info!(index, status = status.as_u16(), "Session opened");
            }
            Err(e) => {
                failures += 1;
                warn!(
                    index,
                    status = e.status().map(|s| s.as_u16()),
                    error = %e,
                    "Failed to open session, skipping"
                );
            }
        }
    }

    failures
}

/// Sleeps for `duration` unless cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) {
    if duration.is_zero() {
        return;
    }
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}
