//! Partitions via `sysinfo` for platforms without procfs

use crate::disk::traits::*;
use crate::error::{Error, Result};
use sysinfo::Disks;

/// Mounted volumes as listed by `sysinfo::Disks` at construction
pub struct SysinfoDisks {
    disks: Disks,
}

impl SysinfoDisks {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoDisks {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionSource for SysinfoDisks {
    fn partitions(&self) -> Result<Vec<Partition>> {
        Ok(self
            .disks
            .list()
            .iter()
            .map(|disk| Partition {
                device: disk.name().to_string_lossy().into_owned(),
                mountpoint: disk.mount_point().to_string_lossy().into_owned(),
                fstype: disk.file_system().to_string_lossy().into_owned(),
            })
            .collect())
    }

    fn usage(&self, mountpoint: &str) -> Result<DiskUsage> {
        let disk = self
            .disks
            .list()
            .iter()
            .find(|disk| disk.mount_point().to_string_lossy() == mountpoint)
            .ok_or_else(|| Error::DeviceNotFound(mountpoint.to_string()))?;

        let total = disk.total_space();
        let free = disk.available_space();
        Ok(DiskUsage::new(total, total.saturating_sub(free), free))
    }
}
