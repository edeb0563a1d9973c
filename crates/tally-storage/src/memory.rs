use async_trait::async_trait;
use std::collections::BTreeMap;
use tally_common::types::Update;

use crate::error::Result;
use crate::repository::{CounterRepo, GaugeRepo};
use crate::MetricsStorage;

/// Pass-through over a counter and a gauge repository. Nothing is persisted.
#[derive(Default)]
pub struct MemStorage {
    pub(crate) counters: CounterRepo,
    pub(crate) gauges: GaugeRepo,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn apply(&self, update: &Update) -> Result<()> {
        match update {
            Update::Counter { name, delta } => {
                self.counters.update(name, *delta)?;
            }
            Update::Gauge { name, value } => {
                self.gauges.update(name, *value);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsStorage for MemStorage {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<f64> {
        Ok(self.gauges.update(name, value))
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<i64> {
        self.counters.update(name, delta)
    }

    async fn set_counter(&self, name: &str, value: i64) -> Result<i64> {
        Ok(self.counters.set(name, value))
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        self.gauges.get(name)
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        self.counters.get(name)
    }

    async fn get_all_gauges(&self) -> Result<BTreeMap<String, f64>> {
        Ok(self.gauges.get_all())
    }

    async fn get_all_counters(&self) -> Result<BTreeMap<String, i64>> {
        Ok(self.counters.get_all())
    }

    async fn insert_batch(&self, batch: &[Update]) -> Result<()> {
        for update in batch {
            self.apply(update)?;
        }
        Ok(())
    }
}
