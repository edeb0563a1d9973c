use std::sync::Arc;
use std::time::Duration;
use tally_common::types::POLL_COUNT;
use tally_storage::MetricsStorage;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::Collector;

/// Outcome of one poll tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub written: usize,
    pub failed: usize,
}

/// Samples every collector on a fixed interval and writes the readings into
/// a storage backend as gauges.
///
/// Collection is best-effort per metric: a collector or a single update
/// failing is logged and the rest of the tick proceeds.
pub struct Poller {
    storage: Arc<dyn MetricsStorage>,
    collectors: Vec<Box<dyn Collector>>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        storage: Arc<dyn MetricsStorage>,
        collectors: Vec<Box<dyn Collector>>,
        interval: Duration,
    ) -> Self {
        Self {
            storage,
            collectors,
            interval,
        }
    }

    pub async fn poll(&mut self) -> PollReport {
        let mut report = PollReport::default();

        match self.storage.update_counter(POLL_COUNT, 1).await {
            Ok(_) => report.written += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!(name = POLL_COUNT, error = %e, "Failed to update metric");
            }
        }

        for collector in &mut self.collectors {
            let samples = match collector.collect() {
                Ok(samples) => samples,
                Err(e) => {
                    tracing::warn!(collector = collector.name(), error = %e, "Collection failed");
                    continue;
                }
            };
            for sample in samples {
                match self.storage.update_gauge(&sample.name, sample.value).await {
                    Ok(_) => report.written += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::error!(
                            name = %sample.name,
                            value = sample.value,
                            error = %e,
                            "Failed to update metric"
                        );
                    }
                }
            }
        }

        tracing::debug!(written = report.written, failed = report.failed, "Metrics collected");
        report
    }

    /// Polls on every tick until `stop` is cancelled.
    pub async fn run(mut self, stop: CancellationToken) {
        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval = ?self.interval,
            collectors = self.collectors.len(),
            "Poller started"
        );

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                _ = tick.tick() => {
                    self.poll().await;
                }
            }
        }
    }
}
