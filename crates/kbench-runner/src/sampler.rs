//! Periodic resource and throughput sampling.
//!
//! Every interval the sampler reads the backend process's CPU and memory,
//! drains the metrics registry, folds the window into the running totals
//! and appends one [`Sample`] to the shared history.
//!
//! # Failure Handling
//!
//! - Target process not found at startup: the sampler logs and exits; the
//!   snapshot writer keeps persisting whatever history exists.
//! - Inspector failure on a tick: nothing is drained or appended and the
//!   window is extended to the next tick, so no counts and no throughput
//!   are lost.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kbench_core::Sample;

use crate::history::SampleHistory;
use crate::inspector::{InspectError, ProcessInspector};
use crate::metrics::{MetricsHandle, RunningTotals};

/// Default time between samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Why the sampler stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplerExit {
    Cancelled,
    ProcessNotFound(InspectError),
}

/// Periodic sampler for one process.
pub struct ResourceSampler {
    inspector: Box<dyn ProcessInspector>,
    metrics: MetricsHandle,
    totals: Arc<RunningTotals>,
    history: SampleHistory,
    interval: Duration,
}

impl ResourceSampler {
    pub fn new(
        inspector: Box<dyn ProcessInspector>,
        metrics: MetricsHandle,
        totals: Arc<RunningTotals>,
        history: SampleHistory,
        interval: Duration,
    ) -> Self {
        Self {
            inspector,
            metrics,
            totals,
            history,
            interval,
        }
    }

    /// Samples until cancelled or until the process cannot be located.
    pub async fn run(mut self, cancel: CancellationToken) -> SamplerExit {
        let pid = self.inspector.pid();

        if let Err(e) = self.inspector.attach() {
            error!(pid, error = %e, "Failed to locate target process, sampler stopping");
            return SamplerExit::ProcessNotFound(e);
        }

        info!(
            pid,
            interval_ms = self.interval.as_millis() as u64,
            "Resource sampler started"
        );

        let mut window_start = Instant::now();
        let mut tick = interval_at(window_start + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(pid, "Resource sampler shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let now = Instant::now();
                    match self.observe(now.duration_since(window_start)).await {
                        Ok(sample) => {
                            debug!(
                                pid,
                                cpu = format!("{:.1}", sample.cpu_usage),
                                memory_mb = format!("{:.1}", sample.memory_usage_mb),
                                sent = sample.messages_sent_count,
                                received = sample.messages_received_count,
                                "Sample recorded"
                            );
                            window_start = now;
                        }
                        Err(e) => {
                            warn!(pid, error = %e, "Failed to sample process, retrying next tick");
                        }
                    }
                }
            }
        }

        SamplerExit::Cancelled
    }

    /// Takes one sample covering a window of length `elapsed`.
    async fn observe(&mut self, elapsed: Duration) -> Result<Sample, InspectError> {
        let usage = self.inspector.sample()?;

        let window = self.metrics.drain();
        let totals = self.totals.fold(window);
        let secs = elapsed.as_secs_f64();

        let sample = Sample {
            timestamp: Utc::now(),
            cpu_usage: usage.cpu_percent,
            memory_usage_mb: usage.memory_mb(),
            messages_sent_count: totals.sent,
            messages_received_count: totals.received,
            message_sent_throughput: Sample::throughput(window.sent, secs),
            message_received_throughput: Sample::throughput(window.received, secs),
        };

        self.history.push(sample.clone()).await;
        Ok(sample)
    }
}

/// Spawns the sampler on its own task.
pub fn spawn_sampler(sampler: ResourceSampler, cancel: CancellationToken) -> JoinHandle<SamplerExit> {
    tokio::spawn(sampler.run(cancel))
}
