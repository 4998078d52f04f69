//! Append-only sample history shared by the sampler and the snapshot writer.

use std::sync::Arc;

use tokio::sync::Mutex;

use kbench_core::Sample;

/// Ordered, append-only list of samples behind a shared lock.
///
/// The sampler appends; the snapshot writer copies. Both hold the lock only
/// for the append or the copy.
#[derive(Debug, Clone, Default)]
pub struct SampleHistory {
    inner: Arc<Mutex<Vec<Sample>>>,
}

impl SampleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, sample: Sample) {
        self.inner.lock().await.push(sample);
    }

    /// Point-in-time copy of the whole history.
    pub async fn snapshot(&self) -> Vec<Sample> {
        self.inner.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
