//! Memory probe

use crate::host::HostInfo;
use serde::{Deserialize, Serialize};

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// Point-in-time physical memory snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Total physical RAM in bytes
    pub total_bytes: u64,
}

impl MemorySnapshot {
    /// Read total physical memory from the OS layer
    pub fn collect(host: &dyn HostInfo) -> Self {
        Self {
            total_bytes: host.total_memory(),
        }
    }

    /// Total RAM in GB (2^30 bytes)
    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_GIB
    }
}
