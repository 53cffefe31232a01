//! # hwcheck
//!
//! One-shot hardware diagnostic report. Four independent probes query the
//! host once each and produce immutable snapshots, which a separate
//! formatting stage prints:
//!
//! | Probe  | Sources |
//! |--------|---------|
//! | CPU    | OS layer (`sysinfo`), `/proc/cpuinfo` + sysfs cache topology |
//! | Memory | OS layer (`sysinfo`) |
//! | Disk   | `/proc/mounts` + statvfs (Linux), `sysinfo::Disks` elsewhere |
//! | GPU    | CUDA runtime, NVML, CUDA driver contexts |
//!
//! ## Quick Start
//!
//! ```no_run
//! use hwcheck::{host::SysinfoHost, memory::MemorySnapshot};
//!
//! let host = SysinfoHost::new();
//! let memory = MemorySnapshot::collect(&host);
//! println!("{:.2} GB", memory.total_gb());
//! ```
//!
//! ## Feature Flags
//!
//! - `nvidia` - NVML vendor utility layer
//! - `cuda` - CUDA runtime and driver layers (libraries loaded at runtime)
//! - `cli` - the `hwcheck` binary

pub mod cpu;
pub mod disk;
pub mod error;
pub mod gpu;
pub mod host;
pub mod memory;
pub mod report;

pub use cpu::{CpuIdentifier, CpuSnapshot};
pub use disk::{DiskSnapshot, PartitionSource};
pub use error::{Error, Result};
pub use gpu::{ComputeDriver, ComputeRuntime, GpuSnapshot, GpuUtility};
pub use host::{HostInfo, SysinfoHost};
pub use memory::MemorySnapshot;

use std::io::Write;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The collaborators each probe queries
pub struct Probes<'a> {
    pub host: &'a dyn HostInfo,
    pub identifier: &'a dyn CpuIdentifier,
    pub partitions: &'a dyn PartitionSource,
    pub runtime: &'a dyn ComputeRuntime,
    pub utility: &'a dyn GpuUtility,
    pub driver: &'a dyn ComputeDriver,
}

impl Probes<'_> {
    /// Run CPU, memory, disk and GPU probes in that order, printing each
    /// report before the next probe starts
    pub fn run(&self, out: &mut dyn Write) -> Result<()> {
        let cpu = CpuSnapshot::collect(self.host, self.identifier);
        report::write_cpu(out, &cpu)?;

        let memory = MemorySnapshot::collect(self.host);
        report::write_memory(out, &memory)?;

        let disk = DiskSnapshot::collect(self.partitions)?;
        report::write_disk(out, &disk)?;

        let gpu = GpuSnapshot::collect(self.runtime, self.utility, self.driver)?;
        report::write_gpu(out, &gpu)?;

        out.flush()?;
        Ok(())
    }
}

/// Run every probe against this host's platform backends
pub fn run(out: &mut dyn Write) -> Result<()> {
    let host = SysinfoHost::new();
    let identifier = cpu::platform_identifier(&host);
    let partitions = disk::platform_source();
    let runtime = gpu::platform_runtime();
    let utility = gpu::platform_utility();
    let driver = gpu::platform_driver();

    Probes {
        host: &host,
        identifier: identifier.as_ref(),
        partitions: partitions.as_ref(),
        runtime: runtime.as_ref(),
        utility: utility.as_ref(),
        driver: driver.as_ref(),
    }
    .run(out)
}
