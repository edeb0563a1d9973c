use crate::{Collector, Sample};
use anyhow::Result;
use sysinfo::System;

/// Host memory totals.
pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self) -> Result<Vec<Sample>> {
        self.system.refresh_memory();

        Ok(vec![
            Sample::new("TotalMemory", self.system.total_memory() as f64),
            Sample::new("FreeMemory", self.system.free_memory() as f64),
            Sample::new("AvailableMemory", self.system.available_memory() as f64),
            Sample::new("UsedMemory", self.system.used_memory() as f64),
            Sample::new("TotalSwap", self.system.total_swap() as f64),
            Sample::new("UsedSwap", self.system.used_swap() as f64),
        ])
    }
}
