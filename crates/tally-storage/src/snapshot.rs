//! Dump file persistence: the `{"metrics": [...]}` format, the periodic
//! [`Saver`] and the startup [`Loader`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tally_common::types::{MetricsDump, Update};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StorageError};
use crate::MetricsStorage;

fn dump_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Dump {
        path: path.display().to_string(),
        source,
    }
}

/// Writes a full snapshot as pretty-printed JSON, gauges first.
///
/// The file is written next to its final location and renamed over it, so
/// readers never see a half-written dump.
pub async fn write_metrics(
    path: &Path,
    counters: &BTreeMap<String, i64>,
    gauges: &BTreeMap<String, f64>,
) -> Result<()> {
    let data = serde_json::to_vec_pretty(&MetricsDump::new(counters, gauges))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(dump_error(path))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, &data).await.map_err(dump_error(path))?;
    tokio::fs::rename(&tmp, path).await.map_err(dump_error(path))?;
    Ok(())
}

pub async fn read_dump(path: &Path) -> Result<MetricsDump> {
    let data = tokio::fs::read(path).await.map_err(dump_error(path))?;
    Ok(serde_json::from_slice(&data)?)
}

/// Restores a dump into a storage backend at startup.
///
/// Counters are restored with `set_counter` and gauges with `update_gauge`,
/// so restoring replaces values instead of adding to them. A missing or
/// unreadable file is returned to the caller; nothing is retried here.
pub struct Loader {
    path: PathBuf,
}

impl Loader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the number of records restored.
    pub async fn load(&self, storage: &dyn MetricsStorage) -> Result<usize> {
        let dump = read_dump(&self.path).await?;
        let mut restored = 0;
        for metric in dump.metrics {
            match Update::try_from(metric)? {
                Update::Counter { name, delta } => {
                    storage.set_counter(&name, delta).await?;
                }
                Update::Gauge { name, value } => {
                    storage.update_gauge(&name, value).await?;
                }
            }
            restored += 1;
        }
        tracing::info!(path = %self.path.display(), restored, "Restored metrics dump");
        Ok(restored)
    }
}

/// Periodically writes the full metric set of a storage backend to the dump
/// file. Used only when the backend does not dump on every write.
pub struct Saver {
    storage: Arc<dyn MetricsStorage>,
    path: PathBuf,
    interval: Duration,
}

impl Saver {
    pub fn new(
        storage: Arc<dyn MetricsStorage>,
        path: impl Into<PathBuf>,
        interval: Duration,
    ) -> Self {
        Self {
            storage,
            path: path.into(),
            interval,
        }
    }

    pub async fn save(&self) -> Result<()> {
        let gauges = self.storage.get_all_gauges().await?;
        let counters = self.storage.get_all_counters().await?;
        write_metrics(&self.path, &counters, &gauges).await?;
        tracing::debug!(
            path = %self.path.display(),
            gauges = gauges.len(),
            counters = counters.len(),
            "Saved metrics dump"
        );
        Ok(())
    }

    /// Ticks until `stop` is cancelled. A cycle already running when the
    /// signal arrives completes first.
    pub async fn run(self, stop: CancellationToken) {
        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(path = %self.path.display(), interval = ?self.interval, "Saver started");

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                _ = tick.tick() => {
                    if let Err(e) = self.save().await {
                        tracing::error!(
                            path = %self.path.display(),
                            error = %e,
                            "Failed to save metrics"
                        );
                    }
                }
            }
        }
    }
}
