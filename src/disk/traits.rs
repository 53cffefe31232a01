//! Partition and usage types shared by the disk sources

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A mounted filesystem volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Device path or name (e.g. "/dev/nvme0n1p2")
    pub device: String,
    /// Mount point (e.g. "/home")
    pub mountpoint: String,
    /// Filesystem type (e.g. "ext4")
    pub fstype: String,
}

/// Space accounting for one mounted filesystem, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    /// Space available to unprivileged users
    pub free: u64,
    /// Used share of the user-visible space, one decimal
    pub percent: f64,
}

impl DiskUsage {
    /// Build usage figures, deriving the percentage from `used / (used + free)`
    pub fn new(total: u64, used: u64, free: u64) -> Self {
        Self {
            total,
            used,
            free,
            percent: usage_percent(used, used.saturating_add(free)),
        }
    }
}

/// Percentage rounded to one decimal; zero when `whole` is zero
pub fn usage_percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let pct = part as f64 / whole as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Source of mounted partitions and their usage
pub trait PartitionSource {
    /// Enumerate mounted partitions in mount order
    fn partitions(&self) -> Result<Vec<Partition>>;

    /// Usage statistics for one mount point
    fn usage(&self, mountpoint: &str) -> Result<DiskUsage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_percent() {
        assert_eq!(usage_percent(0, 0), 0.0);
        assert_eq!(usage_percent(1, 3), 33.3);
        assert_eq!(usage_percent(2, 3), 66.7);
        assert_eq!(usage_percent(10, 10), 100.0);
    }

    #[test]
    fn test_usage_percent_excludes_reserved_blocks() {
        // 100 blocks, 10 reserved for root: used 40, available 50
        let usage = DiskUsage::new(100, 40, 50);
        assert_eq!(usage.percent, 44.4);
    }
}
