//! Query interfaces for the three GPU layers
//!
//! Each layer is an independent source. Nothing here reconciles their answers.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Compute runtime view (availability, version, current device)
pub trait ComputeRuntime {
    /// Whether a runtime with at least one usable device is present
    fn is_available(&self) -> bool;

    /// Runtime version as "major.minor"
    fn version(&self) -> Result<String>;

    /// Ordinal of the runtime's current device
    fn current_device(&self) -> Result<u32>;

    /// Device name (e.g. "NVIDIA GeForce RTX 4090")
    fn device_name(&self, device: u32) -> Result<String>;

    /// Total device memory in bytes
    fn total_memory(&self, device: u32) -> Result<u64>;

    /// Device memory in bytes allocated by every process on the device,
    /// not only this one
    fn memory_allocated(&self, device: u32) -> Result<u64>;
}

/// One GPU as the vendor utility reports it, memory in MiB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityObservation {
    pub id: u32,
    pub name: String,
    pub memory_total_mb: f64,
    pub memory_free_mb: f64,
    pub memory_used_mb: f64,
}

/// Vendor GPU utility (device enumeration)
pub trait GpuUtility {
    /// Enumerate GPUs in utility order; no utility means no devices
    fn devices(&self) -> Result<Vec<UtilityObservation>>;
}

/// Low-level compute driver
pub trait ComputeDriver {
    /// Total memory of the device with this ordinal, in bytes
    fn total_memory(&self, ordinal: u32) -> Result<u64>;

    /// Create a context on the device and make it current
    ///
    /// The context is released when the returned value is dropped.
    fn make_context(&self, ordinal: u32) -> Result<Box<dyn DeviceContext + '_>>;
}

/// A device context held for the lifetime of the value
pub trait DeviceContext {
    /// `(free, total)` device memory in bytes as seen from this context
    fn mem_get_info(&self) -> Result<(u64, u64)>;
}
