//! Periodic delivery of the agent's metric set.
//!
//! Each cycle reads every gauge and counter, splits the batch into chunks of
//! [`CHUNK_SIZE`] records and hands the chunks to a pool of `rate_limit`
//! workers. A worker encodes its chunk (JSON, gzip, optional HMAC, optional
//! RSA) and delivers it, retrying refused connections. After every job has
//! reported back, `PollCount` is reset to zero whether or not all chunks
//! made it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tally_common::crypto::{self, RsaPublicKey};
use tally_common::retry::{retry, RetryPolicy};
use tally_common::types::{make_batch, Metric, POLL_COUNT};
use tally_common::{codec, sign};
use tally_storage::MetricsStorage;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::transport::{DeliveryError, Payload, Transport};

/// Records per request. Keeps the compressed body well under the RSA
/// PKCS#1 v1.5 plaintext limit of a 2048-bit key.
pub const CHUNK_SIZE: usize = 3;

/// Splits a batch into consecutive chunks of at most `size` records,
/// preserving order. A size of 0 is treated as 1.
///
/// # Examples
///
/// ```
/// use tally_agent::sender::chunk_batch;
/// use tally_common::types::Metric;
///
/// let batch: Vec<_> = (0..7).map(|i| Metric::counter(format!("c{i}"), i)).collect();
/// let chunks = chunk_batch(batch, 3);
/// assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), [3, 3, 1]);
/// ```
pub fn chunk_batch(batch: Vec<Metric>, size: usize) -> Vec<Vec<Metric>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(batch.len().div_ceil(size));
    let mut rest = batch.into_iter().peekable();
    while rest.peek().is_some() {
        chunks.push(rest.by_ref().take(size).collect());
    }
    chunks
}

/// Turns a chunk into a wire payload.
#[derive(Default)]
pub struct Encoder {
    key: Option<Vec<u8>>,
    public_key: Option<RsaPublicKey>,
}

impl Encoder {
    pub fn new(key: Option<&str>, public_key: Option<RsaPublicKey>) -> Self {
        Self {
            key: key.map(|k| k.as_bytes().to_vec()),
            public_key,
        }
    }

    /// JSON, then gzip. The signature covers the compressed bytes; encryption,
    /// when enabled, replaces them as the body.
    pub fn encode(&self, chunk: &[Metric]) -> Result<Payload, DeliveryError> {
        let json = serde_json::to_vec(chunk)?;
        let compressed = codec::compress(&json).map_err(DeliveryError::Compress)?;
        let signature = match &self.key {
            Some(key) => Some(sign::sign(key, &compressed)?),
            None => None,
        };
        let body = match &self.public_key {
            Some(public_key) => crypto::encrypt(public_key, &compressed)?,
            None => compressed,
        };
        Ok(Payload { body, signature })
    }
}

/// Outcome of one report cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub jobs: usize,
    pub delivered: usize,
    pub failed: usize,
}

struct Job {
    id: usize,
    chunk: Vec<Metric>,
}

struct JobResult {
    id: usize,
    records: usize,
    outcome: Result<(), DeliveryError>,
}

pub struct Sender {
    storage: Arc<dyn MetricsStorage>,
    transport: Arc<dyn Transport>,
    encoder: Arc<Encoder>,
    workers: usize,
    chunk_size: usize,
    interval: Duration,
    policy: RetryPolicy,
}

impl Sender {
    pub fn new(
        storage: Arc<dyn MetricsStorage>,
        transport: Arc<dyn Transport>,
        encoder: Encoder,
        workers: usize,
        interval: Duration,
    ) -> Self {
        Self {
            storage,
            transport,
            encoder: Arc::new(encoder),
            workers: workers.max(1),
            chunk_size: CHUNK_SIZE,
            interval,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn read_batch(&self) -> Vec<Metric> {
        let gauges = self.storage.get_all_gauges().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to read gauge metrics");
            BTreeMap::new()
        });
        let counters = self.storage.get_all_counters().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to read counter metrics");
            BTreeMap::new()
        });
        make_batch(&counters, &gauges)
    }

    /// Runs one full cycle: read, chunk, deliver through the pool, drain
    /// results, reset `PollCount`.
    pub async fn report(&self) -> CycleReport {
        let chunks = chunk_batch(self.read_batch().await, self.chunk_size);
        let mut report = CycleReport {
            jobs: chunks.len(),
            ..CycleReport::default()
        };

        let (job_tx, job_rx) = mpsc::channel::<Job>(self.workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(self.workers);

        tracing::debug!(jobs = report.jobs, workers = self.workers, "Starting workers");
        for _ in 0..self.workers {
            tokio::spawn(worker(
                job_rx.clone(),
                result_tx.clone(),
                self.transport.clone(),
                self.encoder.clone(),
                self.policy.clone(),
            ));
        }
        drop(result_tx);

        let dispatch = async move {
            for (i, chunk) in chunks.into_iter().enumerate() {
                if job_tx.send(Job { id: i + 1, chunk }).await.is_err() {
                    break;
                }
            }
        };
        let drain = async {
            while let Some(result) = result_rx.recv().await {
                match result.outcome {
                    Ok(()) => {
                        report.delivered += 1;
                        tracing::debug!(
                            id = result.id,
                            records = result.records,
                            "Chunk delivered"
                        );
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::error!(
                            id = result.id,
                            records = result.records,
                            error = %e,
                            "Chunk delivery failed"
                        );
                    }
                }
            }
        };
        tokio::join!(dispatch, drain);

        // Unconditional: a failed chunk's share of PollCount is dropped.
        if let Err(e) = self.storage.set_counter(POLL_COUNT, 0).await {
            tracing::error!(name = POLL_COUNT, error = %e, "Failed to reset metric");
        }

        tracing::info!(
            jobs = report.jobs,
            delivered = report.delivered,
            failed = report.failed,
            "Report cycle finished"
        );
        report
    }

    /// Reports on every tick until `stop` is cancelled.
    pub async fn run(self, stop: CancellationToken) {
        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.interval, workers = self.workers, "Sender started");

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                _ = tick.tick() => {
                    self.report().await;
                }
            }
        }
    }
}

async fn worker(
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<JobResult>,
    transport: Arc<dyn Transport>,
    encoder: Arc<Encoder>,
    policy: RetryPolicy,
) {
    loop {
        // hold the lock only while waiting for the next job
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else { return };

        let outcome = match encoder.encode(&job.chunk) {
            Ok(payload) => {
                retry(&policy, "deliver", DeliveryError::is_transient, || {
                    transport.deliver(&payload)
                })
                .await
            }
            Err(e) => Err(e),
        };
        let result = JobResult {
            id: job.id,
            records: job.chunk.len(),
            outcome,
        };
        if results.send(result).await.is_err() {
            return;
        }
    }
}
