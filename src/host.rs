//! OS abstraction layer
//!
//! Core counts, processor identity and physical memory as reported by the
//! operating system, read through `sysinfo`.

use sysinfo::System;

/// OS-level host introspection consumed by the CPU and memory probes
pub trait HostInfo {
    /// Number of physical cores, if the OS exposes it
    fn physical_cores(&self) -> Option<usize>;

    /// Number of logical processors
    fn logical_cores(&self) -> usize;

    /// Processor identifier string (may be empty)
    fn processor(&self) -> String;

    /// CPU vendor identifier (may be empty)
    fn vendor(&self) -> String;

    /// Current frequency of the first processor in MHz, if known
    fn frequency_mhz(&self) -> Option<u64>;

    /// Total physical memory in bytes
    fn total_memory(&self) -> u64;
}

/// [`HostInfo`] backed by a `sysinfo::System` refreshed once at construction
pub struct SysinfoHost {
    sys: System,
}

impl SysinfoHost {
    /// Query the OS for CPU and memory state
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        Self { sys }
    }
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostInfo for SysinfoHost {
    fn physical_cores(&self) -> Option<usize> {
        self.sys.physical_core_count()
    }

    fn logical_cores(&self) -> usize {
        self.sys.cpus().len()
    }

    fn processor(&self) -> String {
        self.sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .unwrap_or_default()
    }

    fn vendor(&self) -> String {
        self.sys
            .cpus()
            .first()
            .map(|cpu| cpu.vendor_id().to_string())
            .unwrap_or_default()
    }

    fn frequency_mhz(&self) -> Option<u64> {
        self.sys
            .cpus()
            .first()
            .map(|cpu| cpu.frequency())
            .filter(|&mhz| mhz > 0)
    }

    fn total_memory(&self) -> u64 {
        self.sys.total_memory()
    }
}

/// Fixed host values for probe tests
#[cfg(test)]
pub(crate) struct FakeHost {
    pub physical: Option<usize>,
    pub logical: usize,
    pub processor: String,
    pub vendor: String,
    pub mhz: Option<u64>,
    pub memory: u64,
}

#[cfg(test)]
impl Default for FakeHost {
    fn default() -> Self {
        Self {
            physical: Some(8),
            logical: 16,
            processor: "AMD Ryzen 7 5800X 8-Core Processor".to_string(),
            vendor: "AuthenticAMD".to_string(),
            mhz: Some(3800),
            memory: 16 * (1 << 30),
        }
    }
}

#[cfg(test)]
impl HostInfo for FakeHost {
    fn physical_cores(&self) -> Option<usize> {
        self.physical
    }

    fn logical_cores(&self) -> usize {
        self.logical
    }

    fn processor(&self) -> String {
        self.processor.clone()
    }

    fn vendor(&self) -> String {
        self.vendor.clone()
    }

    fn frequency_mhz(&self) -> Option<u64> {
        self.mhz
    }

    fn total_memory(&self) -> u64 {
        self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysinfo_host_reports_processors() {
        let host = SysinfoHost::new();
        assert!(host.logical_cores() >= 1);
        assert!(host.total_memory() > 0);
        if let Some(physical) = host.physical_cores() {
            assert!(physical <= host.logical_cores());
        }
    }
}
