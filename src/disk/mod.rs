//! Disk probe
//!
//! Enumerates mounted partitions and queries usage for each one. A partition
//! whose statistics are access-denied is reported as inaccessible and
//! enumeration continues; any other failure aborts the probe.
//!
//! Platform support:
//! - Linux: `/proc/mounts`, `/proc/filesystems`, statvfs
//! - Others: `sysinfo::Disks`

pub mod traits;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(not(target_os = "linux"))]
pub mod generic;

use crate::error::Result;
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use traits::{usage_percent, DiskUsage, Partition, PartitionSource};

/// Usage outcome for a single partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionUsage {
    Available(DiskUsage),
    /// Statistics could not be read due to missing permissions
    Inaccessible,
}

/// One partition and its usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionReport {
    pub partition: Partition,
    pub usage: PartitionUsage,
}

/// Point-in-time disk snapshot, in enumeration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSnapshot {
    pub partitions: Vec<PartitionReport>,
}

impl DiskSnapshot {
    /// Query usage of every partition `source` enumerates
    pub fn collect(source: &dyn PartitionSource) -> Result<Self> {
        let mut partitions = Vec::new();

        for partition in source.partitions()? {
            let usage = match source.usage(&partition.mountpoint) {
                Ok(usage) => PartitionUsage::Available(usage),
                Err(e) if e.is_permission_denied() => {
                    log::warn!("Cannot read usage of {}: {}", partition.mountpoint, e);
                    PartitionUsage::Inaccessible
                }
                Err(e) => return Err(e),
            };
            partitions.push(PartitionReport { partition, usage });
        }

        Ok(Self { partitions })
    }
}

/// Partition source for the current platform
pub fn platform_source() -> Box<dyn PartitionSource> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::MountTable::new())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Box::new(generic::SysinfoDisks::new())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;

    pub(crate) const GIB: u64 = 1 << 30;

    /// In-memory partitions; mountpoints without usage fail with the stored error kind
    #[derive(Default)]
    pub(crate) struct FakePartitions {
        pub partitions: Vec<Partition>,
        pub usage: HashMap<String, DiskUsage>,
        pub denied: Vec<String>,
    }

    impl FakePartitions {
        pub(crate) fn with(mut self, device: &str, mountpoint: &str, usage: Option<DiskUsage>) -> Self {
            self.partitions.push(Partition {
                device: device.to_string(),
                mountpoint: mountpoint.to_string(),
                fstype: "ext4".to_string(),
            });
            match usage {
                Some(usage) => {
                    self.usage.insert(mountpoint.to_string(), usage);
                }
                None => self.denied.push(mountpoint.to_string()),
            }
            self
        }
    }

    impl PartitionSource for FakePartitions {
        fn partitions(&self) -> Result<Vec<Partition>> {
            Ok(self.partitions.clone())
        }

        fn usage(&self, mountpoint: &str) -> Result<DiskUsage> {
            if self.denied.iter().any(|m| m == mountpoint) {
                return Err(Error::PermissionDenied(mountpoint.to_string()));
            }
            self.usage
                .get(mountpoint)
                .copied()
                .ok_or_else(|| Error::DeviceNotFound(mountpoint.to_string()))
        }
    }

    #[test]
    fn test_one_report_per_partition_despite_denial() {
        let source = FakePartitions::default()
            .with("/dev/sda1", "/", Some(DiskUsage::new(50 * GIB, 10 * GIB, 40 * GIB)))
            .with("/dev/sda2", "/secret", None)
            .with("/dev/sdb1", "/data", Some(DiskUsage::new(100 * GIB, 75 * GIB, 25 * GIB)));

        let snapshot = DiskSnapshot::collect(&source).unwrap();
        assert_eq!(snapshot.partitions.len(), 3);
        assert_eq!(snapshot.partitions[1].usage, PartitionUsage::Inaccessible);
        assert_eq!(snapshot.partitions[2].partition.mountpoint, "/data");
        match &snapshot.partitions[2].usage {
            PartitionUsage::Available(usage) => assert_eq!(usage.percent, 75.0),
            other => panic!("unexpected usage {:?}", other),
        }
    }

    #[test]
    fn test_other_usage_errors_propagate() {
        let mut source = FakePartitions::default().with("/dev/sda1", "/", None);
        source.denied.clear();

        let err = DiskSnapshot::collect(&source).unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[test]
    fn test_no_partitions() {
        let snapshot = DiskSnapshot::collect(&FakePartitions::default()).unwrap();
        assert!(snapshot.partitions.is_empty());
    }

    #[test]
    fn test_snapshot_serializes() {
        let source = FakePartitions::default()
            .with("/dev/sda1", "/", Some(DiskUsage::new(50 * GIB, 10 * GIB, 40 * GIB)))
            .with("/dev/sda2", "/secret", None);
        let snapshot = DiskSnapshot::collect(&source).unwrap();

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"Inaccessible\""));
        let back: DiskSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_platform_source_enumerates() {
        let partitions = platform_source()
            .partitions()
            .expect("mounted partitions should be readable");
        for partition in &partitions {
            assert!(!partition.mountpoint.is_empty());
            assert!(!partition.fstype.is_empty());
        }
    }
}
