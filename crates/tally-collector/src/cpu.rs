use crate::{Collector, Sample};
use anyhow::Result;
use sysinfo::System;

/// Per-core CPU utilization as `CPUutilization1..N`, plus the global average.
///
/// Usage is computed between two refreshes, so the first reading after
/// construction reflects the time since `new`.
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<Sample>> {
        self.system.refresh_cpu_all();

        let mut samples = vec![Sample::new(
            "CPUutilization",
            self.system.global_cpu_usage() as f64,
        )];
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            samples.push(Sample::new(
                format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            ));
        }
        Ok(samples)
    }
}
