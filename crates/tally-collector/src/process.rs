use crate::{Collector, Sample};
use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Resource usage of the agent process itself.
pub struct ProcessCollector {
    system: System,
    pid: Option<Pid>,
}

impl ProcessCollector {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = e, "Cannot determine own pid, process metrics disabled");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn collect(&mut self) -> Result<Vec<Sample>> {
        let pid = self.pid.ok_or_else(|| anyhow!("current pid unknown"))?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow!("process {pid} not found"))?;
        let disk = process.disk_usage();

        Ok(vec![
            Sample::new("ProcessMemory", process.memory() as f64),
            Sample::new("ProcessVirtualMemory", process.virtual_memory() as f64),
            Sample::new("ProcessCPUUsage", process.cpu_usage() as f64),
            Sample::new("ProcessRunTime", process.run_time() as f64),
            Sample::new("ProcessDiskRead", disk.total_read_bytes as f64),
            Sample::new("ProcessDiskWritten", disk.total_written_bytes as f64),
        ])
    }
}
