use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tally_common::supervisor::Supervisor;
use tally_storage::db::DbStorage;
use tally_storage::file::FileStorage;
use tally_storage::memory::MemStorage;
use tally_storage::snapshot::{Loader, Saver};
use tally_storage::MetricsStorage;

use crate::config::{ServerConfig, StorageBackend};

/// Opens the backend the configuration selects, restores the dump when asked
/// and, for the periodic mode, registers the saver with `supervisor`.
pub async fn open_storage(
    config: &ServerConfig,
    supervisor: &mut Supervisor,
) -> Result<Arc<dyn MetricsStorage>> {
    match config.backend() {
        StorageBackend::Database { dsn } => {
            let storage = DbStorage::connect(&dsn).await?;
            tracing::info!("Using database storage");
            Ok(Arc::new(storage))
        }
        StorageBackend::File { path } => {
            let mem = MemStorage::new();
            if config.restore {
                restore(&mem, &path).await;
            }
            tracing::info!(path = %path.display(), "Using file storage, dumping on every write");
            Ok(Arc::new(FileStorage::with_storage(mem, path)))
        }
        StorageBackend::Memory { path, interval } => {
            let mem = MemStorage::new();
            if config.restore {
                restore(&mem, &path).await;
            }
            let storage: Arc<dyn MetricsStorage> = Arc::new(mem);
            let saver = Saver::new(storage.clone(), path.clone(), interval);
            supervisor.spawn("saver", |stop| saver.run(stop));
            tracing::info!(
                path = %path.display(),
                interval = ?interval,
                "Using memory storage with periodic saver"
            );
            Ok(storage)
        }
    }
}

/// A dump that cannot be read is not fatal: the server starts empty.
async fn restore(storage: &MemStorage, path: &Path) {
    if let Err(e) = Loader::new(path).load(storage).await {
        tracing::warn!(path = %path.display(), error = %e, "Skipping restore");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tally_storage::snapshot::write_metrics;

    fn config(dir: &Path, interval: u64) -> ServerConfig {
        ServerConfig {
            store_file: dir.join("dump.json"),
            store_interval_secs: interval,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn restores_dump_into_file_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config(dir.path(), 0);
        write_metrics(
            &config.store_file,
            &BTreeMap::from([("PollCount".to_string(), 3)]),
            &BTreeMap::from([("Alloc".to_string(), 7.0)]),
        )
        .await
        .unwrap();

        let mut supervisor = Supervisor::new();
        let storage = open_storage(&config, &mut supervisor).await.unwrap();
        assert!(supervisor.is_empty());
        assert_eq!(storage.get_counter("PollCount").await.unwrap(), 3);
        assert_eq!(storage.get_gauge("Alloc").await.unwrap(), 7.0);
    }

    #[tokio::test]
    async fn missing_dump_starts_empty_and_memory_mode_runs_a_saver() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config(dir.path(), 60);

        let mut supervisor = Supervisor::new();
        let storage = open_storage(&config, &mut supervisor).await.unwrap();
        assert_eq!(supervisor.len(), 1);
        assert!(storage.get_all_gauges().await.unwrap().is_empty());
        supervisor.shutdown().await;
    }
}
