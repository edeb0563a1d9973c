use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tally_common::types::Update;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::memory::MemStorage;
use crate::snapshot::write_metrics;
use crate::MetricsStorage;

/// In-memory storage that rewrites the dump file after every mutation.
///
/// Dumps are serialized and each one snapshots the maps while holding the
/// dump lock, so the file on disk always matches the latest completed write.
/// A failed dump is logged; the in-memory result is still returned.
pub struct FileStorage {
    inner: MemStorage,
    path: PathBuf,
    dump_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_storage(MemStorage::new(), path)
    }

    /// Wraps an already populated in-memory storage, e.g. one restored from
    /// the dump at startup.
    pub fn with_storage(inner: MemStorage, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
            dump_lock: Mutex::new(()),
        }
    }

    async fn dump(&self) {
        let _guard = self.dump_lock.lock().await;
        let counters = self.inner.counters.get_all();
        let gauges = self.inner.gauges.get_all();
        if let Err(e) = write_metrics(&self.path, &counters, &gauges).await {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to dump metrics");
        }
    }
}

#[async_trait]
impl MetricsStorage for FileStorage {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<f64> {
        let stored = self.inner.update_gauge(name, value).await?;
        self.dump().await;
        Ok(stored)
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<i64> {
        let stored = self.inner.update_counter(name, delta).await?;
        self.dump().await;
        Ok(stored)
    }

    async fn set_counter(&self, name: &str, value: i64) -> Result<i64> {
        let stored = self.inner.set_counter(name, value).await?;
        self.dump().await;
        Ok(stored)
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        self.inner.get_gauge(name).await
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        self.inner.get_counter(name).await
    }

    async fn get_all_gauges(&self) -> Result<BTreeMap<String, f64>> {
        self.inner.get_all_gauges().await
    }

    async fn get_all_counters(&self) -> Result<BTreeMap<String, i64>> {
        self.inner.get_all_counters().await
    }

    async fn insert_batch(&self, batch: &[Update]) -> Result<()> {
        let applied = self.inner.insert_batch(batch).await;
        // partial in-memory progress is still written out
        self.dump().await;
        applied
    }
}
