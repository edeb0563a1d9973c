use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tally_common::types::MetricKind;

use crate::error::{Result, StorageError};

/// An in-memory map from metric name to value behind a single lock.
///
/// The lock is held for one map operation at a time and never across I/O.
/// Counters and gauges live in separate instances, so the two kinds never
/// contend with each other.
pub struct Repository<V> {
    kind: MetricKind,
    metrics: Mutex<HashMap<String, V>>,
}

pub type CounterRepo = Repository<i64>;
pub type GaugeRepo = Repository<f64>;

impl<V: Copy> Repository<V> {
    fn with_kind(kind: MetricKind) -> Self {
        Self {
            kind,
            metrics: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, V>> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `value` unconditionally and returns it.
    pub fn set(&self, name: &str, value: V) -> V {
        self.lock().insert(name.to_string(), value);
        value
    }

    pub fn get(&self, name: &str) -> Result<V> {
        self.lock()
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::NotRegistered {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    /// Copies the whole map out so callers can iterate without holding the lock.
    pub fn get_all(&self) -> BTreeMap<String, V> {
        self.lock()
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Repository<i64> {
    pub fn new() -> Self {
        Self::with_kind(MetricKind::Counter)
    }

    /// Adds `delta` to the stored value (0 if absent) and returns the total.
    pub fn update(&self, name: &str, delta: i64) -> Result<i64> {
        let mut metrics = self.lock();
        let current = metrics.get(name).copied().unwrap_or(0);
        let total = current
            .checked_add(delta)
            .ok_or_else(|| StorageError::CounterOverflow {
                name: name.to_string(),
            })?;
        metrics.insert(name.to_string(), total);
        Ok(total)
    }
}

impl Default for Repository<i64> {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository<f64> {
    pub fn new() -> Self {
        Self::with_kind(MetricKind::Gauge)
    }

    /// Replaces the stored value.
    pub fn update(&self, name: &str, value: f64) -> f64 {
        self.set(name, value)
    }
}

impl Default for Repository<f64> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counter_accumulates_and_set_replaces() {
        let repo = CounterRepo::new();
        assert_eq!(repo.update("c", 2).unwrap(), 2);
        assert_eq!(repo.update("c", 5).unwrap(), 7);
        assert_eq!(repo.set("c", 1), 1);
        assert_eq!(repo.get("c").unwrap(), 1);
    }

    #[test]
    fn counter_overflow_leaves_value_untouched() {
        let repo = CounterRepo::new();
        repo.set("c", i64::MAX);
        assert!(matches!(
            repo.update("c", 1),
            Err(StorageError::CounterOverflow { .. })
        ));
        assert_eq!(repo.get("c").unwrap(), i64::MAX);
    }

    #[test]
    fn gauge_keeps_last_value() {
        let repo = GaugeRepo::new();
        repo.update("g", 12.5);
        repo.update("g", 7.0);
        assert_eq!(repo.get("g").unwrap(), 7.0);
    }

    #[test]
    fn unknown_name_is_not_registered_not_zero() {
        let repo = GaugeRepo::new();
        let err = repo.get("missing").unwrap_err();
        assert!(matches!(
            err,
            StorageError::NotRegistered { kind: MetricKind::Gauge, ref name } if name == "missing"
        ));
    }

    #[test]
    fn get_all_is_a_detached_copy() {
        let repo = CounterRepo::new();
        repo.update("a", 1).unwrap();
        let snapshot = repo.get_all();
        repo.update("b", 1).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let repo = Arc::new(CounterRepo::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        repo.update("PollCount", 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(repo.get("PollCount").unwrap(), 8000);
    }
}
