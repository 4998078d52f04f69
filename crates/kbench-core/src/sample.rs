//! Resource and throughput observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes per megabyte used for memory figures.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One observation of the target process and of message throughput.
///
/// Counts are cumulative since the start of the run; throughputs cover
/// only the sampling window that ended at `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(with = "rfc3339_seconds")]
    pub timestamp: DateTime<Utc>,

    /// CPU usage of the target process (percent of one core, may exceed 100)
    pub cpu_usage: f64,

    /// Resident memory of the target process
    pub memory_usage_mb: f64,

    pub messages_sent_count: u64,
    pub messages_received_count: u64,

    /// Messages sent per second during the window
    pub message_sent_throughput: f64,

    /// Messages received per second during the window
    pub message_received_throughput: f64,
}

impl Sample {
    /// Converts a byte count to megabytes.
    #[must_use]
    pub fn bytes_to_mb(bytes: u64) -> f64 {
        bytes as f64 / BYTES_PER_MB
    }

    /// Per-second rate for `count` events over `elapsed_secs`.
    ///
    /// Returns 0.0 for an empty or non-positive window instead of a NaN or
    /// infinity, which would not survive JSON encoding.
    #[must_use]
    pub fn throughput(count: u64, elapsed_secs: f64) -> f64 {
        if elapsed_secs > 0.0 && elapsed_secs.is_finite() {
            count as f64 / elapsed_secs
        } else {
            0.0
        }
    }
}

/// RFC 3339 with whole seconds and a `Z` suffix, e.g. `2024-05-01T12:00:00Z`.
mod rfc3339_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Resource Summary
// ============================================================================

/// Aggregate view of a sample history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub samples: usize,
    pub avg_cpu: f64,
    pub max_cpu: f64,
    pub avg_memory_mb: f64,
    pub max_memory_mb: f64,

    /// Cumulative counts from the last sample
    pub messages_sent: u64,
    pub messages_received: u64,

    pub peak_sent_throughput: f64,
    pub peak_received_throughput: f64,
}

impl ResourceSummary {
    /// Summarises a history. An empty history yields all zeroes.
    #[must_use]
    pub fn from_samples(samples: &[Sample]) -> Self {
        let Some(last) = samples.last() else {
            return Self::default();
        };

        let n = samples.len() as f64;
        let mut summary = Self {
            samples: samples.len(),
            messages_sent: last.messages_sent_count,
            messages_received: last.messages_received_count,
            ..Self::default()
        };

        let mut cpu_total = 0.0;
        let mut memory_total = 0.0;
        for sample in samples {
            cpu_total += sample.cpu_usage;
            memory_total += sample.memory_usage_mb;
            summary.max_cpu = summary.max_cpu.max(sample.cpu_usage);
            summary.max_memory_mb = summary.max_memory_mb.max(sample.memory_usage_mb);
            summary.peak_sent_throughput = summary
                .peak_sent_throughput
                .max(sample.message_sent_throughput);
            summary.peak_received_throughput = summary
                .peak_received_throughput
                .max(sample.message_received_throughput);
        }
        summary.avg_cpu = cpu_total / n;
        summary.avg_memory_mb = memory_total / n;

        summary
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

impl fmt::Display for ResourceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples:            {}", self.samples)?;
        writeln!(
            f,
            "CPU usage:          avg {:.1}%  max {:.1}%",
            self.avg_cpu, self.max_cpu
        )?;
        writeln!(
            f,
            "Memory usage:       avg {:.1} MB  max {:.1} MB",
            self.avg_memory_mb, self.max_memory_mb
        )?;
        write!(
            f,
            "Peak throughput:    sent {:.1}/s  received {:.1}/s",
            self.peak_sent_throughput, self.peak_received_throughput
        )
    }
}
