//! CPU probe
//!
//! Combines the OS-level view (core counts, processor string) with the
//! hardware identification source. Both halves are always present in the
//! snapshot; fields a source cannot provide are left empty.

pub mod identify;

use crate::host::HostInfo;
use serde::{Deserialize, Serialize};

pub use identify::{CpuIdentifier, CpuIdentity, HostIdentifier, ProcCpuInfo};

/// CPU facts reported by the OS abstraction layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuOsInfo {
    /// Processor identifier string
    pub processor: String,
    /// Physical core count, when the OS exposes it
    pub physical_cores: Option<usize>,
    /// Logical processor count
    pub logical_cores: usize,
}

/// Point-in-time CPU snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub os: CpuOsInfo,
    pub identity: CpuIdentity,
}

impl CpuSnapshot {
    /// Query both sources once
    ///
    /// A failing identification source is logged and replaced by an identity
    /// holding only the architecture, so the section is still reported.
    pub fn collect(host: &dyn HostInfo, identifier: &dyn CpuIdentifier) -> Self {
        let os = CpuOsInfo {
            processor: host.processor(),
            physical_cores: host.physical_cores(),
            logical_cores: host.logical_cores(),
        };

        let identity = identifier.identify().unwrap_or_else(|e| {
            log::warn!("CPU identification failed: {}", e);
            CpuIdentity::bare("unavailable")
        });

        Self { os, identity }
    }
}

/// Identification source appropriate for the current platform
pub fn platform_identifier(host: &dyn HostInfo) -> Box<dyn CpuIdentifier + '_> {
    if cfg!(target_os = "linux") {
        Box::new(ProcCpuInfo::new())
    } else {
        Box::new(HostIdentifier::new(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::host::FakeHost;

    struct FailingIdentifier;

    impl CpuIdentifier for FailingIdentifier {
        fn identify(&self) -> Result<CpuIdentity> {
            Err(Error::NotSupported("no cpuinfo".to_string()))
        }
    }

    #[test]
    fn test_collect_both_sections() {
        let host = FakeHost::default();
        let snapshot = CpuSnapshot::collect(&host, &HostIdentifier::new(&host));

        assert_eq!(snapshot.os.physical_cores, Some(8));
        assert_eq!(snapshot.os.logical_cores, 16);
        assert_eq!(snapshot.os.processor, "AMD Ryzen 7 5800X 8-Core Processor");
        assert_eq!(snapshot.identity.count, Some(16));
    }

    #[test]
    fn test_collect_survives_identification_failure() {
        let host = FakeHost {
            physical: None,
            ..Default::default()
        };
        let snapshot = CpuSnapshot::collect(&host, &FailingIdentifier);

        assert_eq!(snapshot.os.physical_cores, None);
        assert_eq!(snapshot.identity.source, "unavailable");
        assert_eq!(snapshot.identity.brand, None);
        assert_eq!(snapshot.identity.arch_raw, std::env::consts::ARCH);
    }

    #[test]
    fn test_snapshot_serializes() {
        let host = FakeHost::default();
        let snapshot = CpuSnapshot::collect(&host, &HostIdentifier::new(&host));
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: CpuSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
