//! Message counters shared by every connection worker.
//!
//! Workers only ever increment. The resource sampler is the only component
//! that drains, once per sampling window, so a drain never races another
//! drain.
//!
//! A drain is a single atomic swap per counter: an increment that lands on
//! the other side of the swap is counted in the next window, never lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts drained from the registry for one sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowCounts {
    pub sent: u64,
    pub received: u64,
}

impl WindowCounts {
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.sent == 0 && self.received == 0
    }
}

/// Per-window sent/received counters.
///
/// Constructed once per benchmark run and shared as a [`MetricsHandle`].
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    sent: AtomicU64,
    received: AtomicU64,
}

/// Cheap-to-clone handle to the run's metrics registry.
pub type MetricsHandle = Arc<MetricsRegistry>;

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry wrapped in a shareable handle.
    pub fn shared() -> MetricsHandle {
        Arc::new(Self::new())
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Resets both counters to zero and returns their previous values.
    pub fn drain(&self) -> WindowCounts {
        WindowCounts {
            sent: self.sent.swap(0, Ordering::AcqRel),
            received: self.received.swap(0, Ordering::AcqRel),
        }
    }

    /// Current window counts without resetting.
    pub fn peek(&self) -> WindowCounts {
        WindowCounts {
            sent: self.sent.load(Ordering::Acquire),
            received: self.received.load(Ordering::Acquire),
        }
    }
}

/// Cumulative totals across all windows of a run.
///
/// Written only by the sampler (and by the orchestrator's final drain once
/// the sampler has stopped); read by anyone.
#[derive(Debug, Default)]
pub struct RunningTotals {
    sent: AtomicU64,
    received: AtomicU64,
}

impl RunningTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a drained window into the totals and returns the new totals.
    pub fn fold(&self, window: WindowCounts) -> WindowCounts {
        let sent = self.sent.fetch_add(window.sent, Ordering::AcqRel) + window.sent;
        let received = self.received.fetch_add(window.received, Ordering::AcqRel) + window.received;
        WindowCounts { sent, received }
    }

    pub fn get(&self) -> WindowCounts {
        WindowCounts {
            sent: self.sent.load(Ordering::Acquire),
            received: self.received.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_exact_increments() {
        let registry = MetricsRegistry::new();
        for _ in 0..5 {
            registry.record_sent();
        }
        for _ in 0..3 {
            registry.record_received();
        }

        assert_eq!(registry.drain(), WindowCounts { sent: 5, received: 3 });
    }

    #[test]
    fn test_drain_resets_window() {
        let registry = MetricsRegistry::new();
        registry.record_sent();
        let _ = registry.drain();

        assert!(registry.drain().is_zero());

        registry.record_received();
        assert_eq!(registry.drain(), WindowCounts { sent: 0, received: 1 });
    }

    #[test]
    fn test_peek_does_not_reset() {
        let registry = MetricsRegistry::new();
        registry.record_sent();
        registry.record_sent();

        assert_eq!(registry.peek().sent, 2);
        assert_eq!(registry.peek().sent, 2);
        assert_eq!(registry.drain().sent, 2);
    }

    #[test]
    fn test_running_totals_fold() {
        let totals = RunningTotals::new();
        let after_first = totals.fold(WindowCounts { sent: 4, received: 2 });
        assert_eq!(after_first, WindowCounts { sent: 4, received: 2 });

        let after_second = totals.fold(WindowCounts { sent: 1, received: 3 });
        assert_eq!(after_second, WindowCounts { sent: 5, received: 5 });
        assert_eq!(totals.get(), after_second);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let registry = MetricsRegistry::shared();
        let totals = Arc::new(RunningTotals::new());

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        registry.record_sent();
                        registry.record_received();
                    }
                })
            })
            .collect();

        // Drain concurrently with the writers, as the sampler does.
        for _ in 0..100 {
            totals.fold(registry.drain());
            std::thread::yield_now();
        }

        for writer in writers {
            writer.join().unwrap();
        }
        totals.fold(registry.drain());

        assert_eq!(totals.get(), WindowCounts { sent: 80_000, received: 80_000 });
    }
}
