use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counter incremented by the agent on every poll and reset after every report.
pub const POLL_COUNT: &str = "PollCount";

/// Metric kind. The same name may exist independently under both kinds.
///
/// # Examples
///
/// ```
/// use tally_common::types::MetricKind;
///
/// let kind: MetricKind = "gauge".parse().unwrap();
/// assert_eq!(kind, MetricKind::Gauge);
/// assert_eq!(MetricKind::Counter.to_string(), "counter");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = InvalidMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            _ => Err(InvalidMetric::UnknownKind(s.to_string())),
        }
    }
}

/// Reasons a wire or dump record cannot be turned into an [`Update`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidMetric {
    #[error("unknown metric type '{0}'")]
    UnknownKind(String),
    #[error("metric id must not be empty")]
    EmptyId,
    #[error("counter '{0}' has no delta")]
    MissingDelta(String),
    #[error("gauge '{0}' has no value")]
    MissingValue(String),
}

/// A metric record as it travels on the wire and sits in the dump file:
/// `{"id", "type", "delta"?, "value"?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    /// Checks that the record carries the field its kind requires and a
    /// non-empty id.
    pub fn validate(&self) -> Result<(), InvalidMetric> {
        if self.id.is_empty() {
            return Err(InvalidMetric::EmptyId);
        }
        match self.kind {
            MetricKind::Counter if self.delta.is_none() => {
                Err(InvalidMetric::MissingDelta(self.id.clone()))
            }
            MetricKind::Gauge if self.value.is_none() => {
                Err(InvalidMetric::MissingValue(self.id.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// A single typed metric update, the unit every storage backend applies.
///
/// Counters carry a delta that is added to the stored value; gauges carry an
/// absolute value that replaces it.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Counter { name: String, delta: i64 },
    Gauge { name: String, value: f64 },
}

impl TryFrom<Metric> for Update {
    type Error = InvalidMetric;

    fn try_from(metric: Metric) -> Result<Self, Self::Error> {
        metric.validate()?;
        match (metric.kind, metric.delta, metric.value) {
            (MetricKind::Counter, Some(delta), _) => Ok(Update::Counter {
                name: metric.id,
                delta,
            }),
            (MetricKind::Gauge, _, Some(value)) => Ok(Update::Gauge {
                name: metric.id,
                value,
            }),
            (MetricKind::Counter, None, _) => Err(InvalidMetric::MissingDelta(metric.id)),
            (MetricKind::Gauge, _, None) => Err(InvalidMetric::MissingValue(metric.id)),
        }
    }
}

impl From<Update> for Metric {
    fn from(update: Update) -> Self {
        match update {
            Update::Counter { name, delta } => Metric::counter(name, delta),
            Update::Gauge { name, value } => Metric::gauge(name, value),
        }
    }
}

/// Builds one ordered batch from full gauge and counter snapshots: gauges
/// first, then counters, each in name order.
pub fn make_batch(counters: &BTreeMap<String, i64>, gauges: &BTreeMap<String, f64>) -> Vec<Metric> {
    let mut batch = Vec::with_capacity(counters.len() + gauges.len());
    batch.extend(gauges.iter().map(|(name, value)| Metric::gauge(name.clone(), *value)));
    batch.extend(counters.iter().map(|(name, delta)| Metric::counter(name.clone(), *delta)));
    batch
}

/// The on-disk snapshot: `{"metrics": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsDump {
    pub metrics: Vec<Metric>,
}

impl MetricsDump {
    pub fn new(counters: &BTreeMap<String, i64>, gauges: &BTreeMap<String, f64>) -> Self {
        Self {
            metrics: make_batch(counters, gauges),
        }
    }
}
