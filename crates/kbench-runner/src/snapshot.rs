//! Periodic persistence of the sample history.
//!
//! On every tick the writer copies the history under its lock, releases the
//! lock, and rewrites the whole output file as an indented JSON array. The
//! file is written next to the target and renamed over it, so a reader never
//! observes a half-written snapshot.
//!
//! Write failures are logged and retried on the next tick with a fresh copy.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kbench_core::Sample;

use crate::history::SampleHistory;

/// Default time between snapshot writes.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(2);

/// Errors that can occur while reading or writing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to decode snapshot {path}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Encodes samples exactly as they are written to disk.
///
/// Same input, same bytes: a snapshot rewritten from an unchanged history is
/// byte-for-byte identical.
pub fn encode_snapshot(samples: &[Sample]) -> Result<Vec<u8>, SnapshotError> {
    let mut bytes = serde_json::to_vec_pretty(samples)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Reads a snapshot file back into samples.
pub async fn read_snapshot(path: &Path) -> Result<Vec<Sample>, SnapshotError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the sample history to one file on a fixed interval.
pub struct SnapshotWriter {
    path: PathBuf,
    history: SampleHistory,
    interval: Duration,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>, history: SampleHistory, interval: Duration) -> Self {
        Self {
            path: path.into(),
            history,
            interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current history once. Returns the number of samples written.
    pub async fn write_once(&self) -> Result<usize, SnapshotError> {
        let samples = self.history.snapshot().await;
        let bytes = encode_snapshot(&samples)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| SnapshotError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| SnapshotError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| SnapshotError::Io {
                path: self.path.clone(),
                source,
            })?;

        Ok(samples.len())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Writes on every tick until cancelled, then writes one final time.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            path = %self.path.display(),
            interval_ms = self.interval.as_millis() as u64,
            "Snapshot writer started"
        );

        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = tick.tick() => self.write_logged().await,
            }
        }

        self.write_logged().await;
        debug!(path = %self.path.display(), "Snapshot writer stopped");
    }

    async fn write_logged(&self) {
        match self.write_once().await {
            Ok(count) => {
                debug!(path = %self.path.display(), samples = count, "Snapshot written");
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to write snapshot");
            }
        }
    }
}

/// Spawns the writer on its own task.
pub fn spawn_snapshot_writer(writer: SnapshotWriter, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(writer.run(cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample(secs: i64, sent: u64) -> Sample {
        Sample {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            cpu_usage: 3.5,
            memory_usage_mb: 48.25,
            messages_sent_count: sent,
            messages_received_count: sent,
            message_sent_throughput: 1.5,
            message_received_throughput: 1.5,
        }
    }

    async fn history_of(samples: Vec<Sample>) -> SampleHistory {
        let history = SampleHistory::new();
        for s in samples {
            history.push(s).await;
        }
        history
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let history = history_of(vec![sample(0, 1), sample(5, 4), sample(10, 9)]).await;

        let writer = SnapshotWriter::new(&path, history, DEFAULT_SNAPSHOT_INTERVAL);
        assert_eq!(writer.write_once().await.unwrap(), 3);

        let samples = read_snapshot(&path).await.unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
        assert_eq!(samples[2].messages_sent_count, 9);
    }

    #[tokio::test]
    async fn test_output_is_indented_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let writer = SnapshotWriter::new(&path, history_of(vec![sample(0, 1)]).await, DEFAULT_SNAPSHOT_INTERVAL);
        writer.write_once().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n  {\n    \"timestamp\""));
        assert!(text.ends_with("]\n"));
    }

    #[tokio::test]
    async fn test_rewrite_of_unchanged_history_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let writer = SnapshotWriter::new(
            &path,
            history_of(vec![sample(0, 1), sample(5, 2)]).await,
            DEFAULT_SNAPSHOT_INTERVAL,
        );

        writer.write_once().await.unwrap();
        let first = std::fs::read(&path).unwrap();
        writer.write_once().await.unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_write_fully_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "x".repeat(10_000)).unwrap();

        let writer = SnapshotWriter::new(&path, SampleHistory::new(), DEFAULT_SNAPSHOT_INTERVAL);
        assert_eq!(writer.write_once().await.unwrap(), 0);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]\n");
        assert!(!writer.temp_path().exists());
    }

    #[tokio::test]
    async fn test_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("100ms").join("out.json");

        let writer = SnapshotWriter::new(&path, SampleHistory::new(), DEFAULT_SNAPSHOT_INTERVAL);
        writer.write_once().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_write_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let writer = SnapshotWriter::new(blocker.join("out.json"), SampleHistory::new(), DEFAULT_SNAPSHOT_INTERVAL);
        assert!(matches!(writer.write_once().await, Err(SnapshotError::Io { .. })));
    }

    #[tokio::test]
    async fn test_run_writes_periodically_and_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let history = SampleHistory::new();
        let cancel = CancellationToken::new();

        history.push(sample(0, 1)).await;
        let handle = spawn_snapshot_writer(
            SnapshotWriter::new(&path, history.clone(), Duration::from_millis(50)),
            cancel.clone(),
        );

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !path.exists() {
            assert!(std::time::Instant::now() < deadline, "no periodic write");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(read_snapshot(&path).await.unwrap().len(), 1);

        history.push(sample(1, 2)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(read_snapshot(&path).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_read_snapshot_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(read_snapshot(&path).await, Err(SnapshotError::Decode { .. })));
    }
}
