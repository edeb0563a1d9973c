//! Metric storage for the tally collector service.
//!
//! Every backend implements [`MetricsStorage`]:
//!
//! * [`memory::MemStorage`] keeps counters and gauges in two in-process
//!   [`repository::Repository`] maps.
//! * [`file::FileStorage`] wraps the in-memory maps and rewrites the dump file
//!   after every mutation.
//! * [`db::DbStorage`] maps the same operations onto upserts against the
//!   `gauges` and `counters` tables, retrying transient connection failures.
//!
//! [`snapshot`] holds the dump format helpers, the periodic [`snapshot::Saver`]
//! and the startup loader.

pub mod db;
pub mod error;
pub mod file;
pub mod memory;
pub mod repository;
pub mod snapshot;


use async_trait::async_trait;
use std::collections::BTreeMap;
use tally_common::types::Update;

pub use error::{Result, StorageError};

/// The storage contract shared by the memory, file and database backends.
///
/// Counters accumulate: `update_counter` adds `delta` to the stored value and
/// returns the new total. Gauges replace: `update_gauge` stores `value` as-is.
/// Reads of a name that was never written return
/// [`StorageError::NotRegistered`], never a zero.
///
/// Implementations are shared between the HTTP handlers and background loops,
/// hence `Send + Sync`.
#[async_trait]
pub trait MetricsStorage: Send + Sync {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<f64>;

    async fn update_counter(&self, name: &str, delta: i64) -> Result<i64>;

    /// Replaces a counter's value instead of adding to it. Used by the loader
    /// when restoring a dump and by the agent to reset `PollCount`.
    async fn set_counter(&self, name: &str, value: i64) -> Result<i64>;

    async fn get_gauge(&self, name: &str) -> Result<f64>;

    async fn get_counter(&self, name: &str) -> Result<i64>;

    /// A point-in-time copy of every gauge, ordered by name.
    async fn get_all_gauges(&self) -> Result<BTreeMap<String, f64>>;

    /// A point-in-time copy of every counter, ordered by name.
    async fn get_all_counters(&self) -> Result<BTreeMap<String, i64>>;

    /// Applies each update with the same rules as the single-metric calls.
    async fn insert_batch(&self, batch: &[Update]) -> Result<()>;

    /// Checks that the backend can serve requests.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
