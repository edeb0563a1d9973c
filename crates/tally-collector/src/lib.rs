//! Metric sampling for the tally agent.
//!
//! Each [`Collector`] reads one category of process or host statistics and
//! returns named gauge samples. The [`poller::Poller`] loop runs every
//! registered collector on each tick and writes the results into a storage
//! backend, bumping the `PollCount` counter once per tick.

pub mod cpu;
pub mod memory;
pub mod poller;
pub mod process;
pub mod random;

use anyhow::Result;

/// One gauge reading produced by a collector.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: f64,
}

impl Sample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A source of gauge samples running on the agent host.
///
/// The trait requires `Send + Sync` so the poller owning a set of collectors
/// can run on any runtime worker.
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., `"cpu"`), used for logging.
    fn name(&self) -> &str;

    /// Reads current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<Vec<Sample>>;
}

/// The default collector set: process, memory, cpu and the random liveness gauge.
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(process::ProcessCollector::new()),
        Box::new(memory::MemoryCollector::new()),
        Box::new(cpu::CpuCollector::new()),
        Box::new(random::RandomCollector),
    ]
}
