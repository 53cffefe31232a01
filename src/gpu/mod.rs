// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! GPU probe
//!
//! Three best-effort layers, reported side by side:
//!
//! 1. the compute runtime: availability, version, current device, device-wide
//!    allocated vs total memory;
//! 2. the vendor utility (NVML): one record per enumerated GPU;
//! 3. the compute driver: for each enumerated GPU, a scoped device context
//!    re-queries free/total memory.
//!
//! The layers may disagree. Their figures are kept as independent
//! observations and never merged.
//!
//! # Feature Flags
//!
//! - `nvidia` - vendor utility layer via NVML
//! - `cuda` - runtime and driver layers via `libcudart` / `libcuda`
//!
//! A layer whose feature is disabled behaves as absent.

use crate::error::Result;
use serde::{Deserialize, Serialize};

pub mod traits;

#[cfg(feature = "cuda")]
pub mod cuda;

#[cfg(feature = "nvidia")]
pub mod nvidia;

pub use traits::{ComputeDriver, ComputeRuntime, DeviceContext, GpuUtility, UtilityObservation};

/// What the compute runtime reports for its current device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeObservation {
    /// No runtime, or no device the runtime can use
    Unavailable,
    Available {
        version: String,
        device_name: String,
        total_bytes: u64,
        allocated_bytes: u64,
    },
}

impl RuntimeObservation {
    pub fn query(runtime: &dyn ComputeRuntime) -> Result<Self> {
        if !runtime.is_available() {
            return Ok(RuntimeObservation::Unavailable);
        }

        let version = runtime.version()?;
        let device = runtime.current_device()?;
        Ok(RuntimeObservation::Available {
            version,
            device_name: runtime.device_name(device)?,
            total_bytes: runtime.total_memory(device)?,
            allocated_bytes: runtime.memory_allocated(device)?,
        })
    }
}

/// Memory figures re-queried through a driver context, in bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverObservation {
    pub id: u32,
    /// Device total memory
    pub total_bytes: u64,
    /// Free memory seen from the context
    pub free_bytes: u64,
    /// Context total minus free
    pub used_bytes: u64,
}

impl DriverObservation {
    /// Query one device; the context is released before returning, on every path
    pub fn query(driver: &dyn ComputeDriver, id: u32) -> Result<Self> {
        let total_bytes = driver.total_memory(id)?;
        let (free_bytes, context_total) = {
            let context = driver.make_context(id)?;
            context.mem_get_info()?
        };

        Ok(Self {
            id,
            total_bytes,
            free_bytes,
            used_bytes: context_total.saturating_sub(free_bytes),
        })
    }
}

/// One enumerated GPU: the utility's record and the driver's record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDeviceReport {
    pub utility: UtilityObservation,
    pub driver: DriverObservation,
}

/// Point-in-time GPU snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSnapshot {
    pub runtime: RuntimeObservation,
    pub devices: Vec<GpuDeviceReport>,
}

impl GpuSnapshot {
    /// Query the runtime, then pair each utility device with a driver observation
    pub fn collect(
        runtime: &dyn ComputeRuntime,
        utility: &dyn GpuUtility,
        driver: &dyn ComputeDriver,
    ) -> Result<Self> {
        let runtime = RuntimeObservation::query(runtime)?;

        let mut devices = Vec::new();
        for observation in utility.devices()? {
            let driver = DriverObservation::query(driver, observation.id)?;
            devices.push(GpuDeviceReport {
                utility: observation,
                driver,
            });
        }

        Ok(Self { runtime, devices })
    }
}

/// Runtime used when CUDA support is compiled out
pub struct NoRuntime;

impl ComputeRuntime for NoRuntime {
    fn is_available(&self) -> bool {
        false
    }

    fn version(&self) -> Result<String> {
        Err(not_compiled("CUDA runtime"))
    }

    fn current_device(&self) -> Result<u32> {
        Err(not_compiled("CUDA runtime"))
    }

    fn device_name(&self, _device: u32) -> Result<String> {
        Err(not_compiled("CUDA runtime"))
    }

    fn total_memory(&self, _device: u32) -> Result<u64> {
        Err(not_compiled("CUDA runtime"))
    }

    fn memory_allocated(&self, _device: u32) -> Result<u64> {
        Err(not_compiled("CUDA runtime"))
    }
}

/// Utility used when NVML support is compiled out
pub struct NoUtility;

impl GpuUtility for NoUtility {
    fn devices(&self) -> Result<Vec<UtilityObservation>> {
        Ok(Vec::new())
    }
}

/// Driver used when CUDA support is compiled out
pub struct NoDriver;

impl ComputeDriver for NoDriver {
    fn total_memory(&self, _ordinal: u32) -> Result<u64> {
        Err(not_compiled("CUDA driver"))
    }

    fn make_context(&self, _ordinal: u32) -> Result<Box<dyn DeviceContext + '_>> {
        Err(not_compiled("CUDA driver"))
    }
}

fn not_compiled(what: &str) -> crate::Error {
    crate::Error::NotSupported(format!("{} support not compiled in", what))
}

/// Compute runtime for this build
pub fn platform_runtime() -> Box<dyn ComputeRuntime> {
    #[cfg(feature = "cuda")]
    {
        Box::new(cuda::CudaRuntime::new())
    }

    #[cfg(not(feature = "cuda"))]
    {
        Box::new(NoRuntime)
    }
}

/// Vendor utility for this build
pub fn platform_utility() -> Box<dyn GpuUtility> {
    #[cfg(feature = "nvidia")]
    {
        Box::new(nvidia::NvmlUtility::new())
    }

    #[cfg(not(feature = "nvidia"))]
    {
        Box::new(NoUtility)
    }
}

/// Compute driver for this build
pub fn platform_driver() -> Box<dyn ComputeDriver> {
    #[cfg(feature = "cuda")]
    {
        Box::new(cuda::CudaDriver::new())
    }

    #[cfg(not(feature = "cuda"))]
    {
        Box::new(NoDriver)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Error;
    use std::cell::Cell;

    pub(crate) const MIB: u64 = 1 << 20;

    pub(crate) struct FakeRuntime {
        pub available: bool,
    }

    impl ComputeRuntime for FakeRuntime {
        fn is_available(&self) -> bool {
            self.available
        }

        fn version(&self) -> Result<String> {
            Ok("12.4".to_string())
        }

        fn current_device(&self) -> Result<u32> {
            Ok(0)
        }

        fn device_name(&self, _device: u32) -> Result<String> {
            Ok("NVIDIA GeForce RTX 4090".to_string())
        }

        fn total_memory(&self, _device: u32) -> Result<u64> {
            Ok(24564 * MIB)
        }

        fn memory_allocated(&self, _device: u32) -> Result<u64> {
            Ok(512 * MIB)
        }
    }

    pub(crate) struct FakeUtility {
        pub devices: Vec<UtilityObservation>,
    }

    impl FakeUtility {
        pub(crate) fn with_devices(count: u32) -> Self {
            Self {
                devices: (0..count)
                    .map(|id| UtilityObservation {
                        id,
                        name: format!("NVIDIA RTX A{}000", id + 4),
                        memory_total_mb: 16376.0,
                        memory_free_mb: 15000.0,
                        memory_used_mb: 1376.0,
                    })
                    .collect(),
            }
        }
    }

    impl GpuUtility for FakeUtility {
        fn devices(&self) -> Result<Vec<UtilityObservation>> {
            Ok(self.devices.clone())
        }
    }

    /// Driver that counts context acquisitions and releases
    #[derive(Default)]
    pub(crate) struct FakeDriver {
        pub acquired: Cell<usize>,
        pub released: Cell<usize>,
        pub fail_mem_info_on: Option<u32>,
        pub fail_context_on: Option<u32>,
    }

    struct FakeContext<'a> {
        driver: &'a FakeDriver,
        ordinal: u32,
    }

    impl ComputeDriver for FakeDriver {
        fn total_memory(&self, _ordinal: u32) -> Result<u64> {
            Ok(16376 * MIB)
        }

        fn make_context(&self, ordinal: u32) -> Result<Box<dyn DeviceContext + '_>> {
            if self.fail_context_on == Some(ordinal) {
                return Err(Error::Cuda {
                    call: "cuCtxCreate_v2",
                    code: 2,
                });
            }
            self.acquired.set(self.acquired.get() + 1);
            Ok(Box::new(FakeContext {
                driver: self,
                ordinal,
            }))
        }
    }

    impl DeviceContext for FakeContext<'_> {
        fn mem_get_info(&self) -> Result<(u64, u64)> {
            if self.driver.fail_mem_info_on == Some(self.ordinal) {
                return Err(Error::Cuda {
                    call: "cuMemGetInfo_v2",
                    code: 201,
                });
            }
            Ok((14000 * MIB, 16000 * MIB))
        }
    }

    impl Drop for FakeContext<'_> {
        fn drop(&mut self) {
            self.driver.released.set(self.driver.released.get() + 1);
        }
    }

    #[test]
    fn test_runtime_unavailable() {
        let snapshot = GpuSnapshot::collect(
            &FakeRuntime { available: false },
            &FakeUtility::with_devices(0),
            &FakeDriver::default(),
        )
        .unwrap();
        assert_eq!(snapshot.runtime, RuntimeObservation::Unavailable);
        assert!(snapshot.devices.is_empty());
    }

    #[test]
    fn test_runtime_available() {
        let observation = RuntimeObservation::query(&FakeRuntime { available: true }).unwrap();
        assert_eq!(
            observation,
            RuntimeObservation::Available {
                version: "12.4".to_string(),
                device_name: "NVIDIA GeForce RTX 4090".to_string(),
                total_bytes: 24564 * MIB,
                allocated_bytes: 512 * MIB,
            }
        );
    }

    #[test]
    fn test_one_driver_record_per_utility_device() {
        let driver = FakeDriver::default();
        let snapshot = GpuSnapshot::collect(
            &FakeRuntime { available: true },
            &FakeUtility::with_devices(3),
            &driver,
        )
        .unwrap();

        assert_eq!(snapshot.devices.len(), 3);
        for (index, report) in snapshot.devices.iter().enumerate() {
            assert_eq!(report.utility.id as usize, index);
            assert_eq!(report.driver.id as usize, index);
            // Sources disagree and are kept as-is
            assert_eq!(report.driver.total_bytes, 16376 * MIB);
            assert_eq!(report.driver.free_bytes, 14000 * MIB);
            assert_eq!(report.driver.used_bytes, 2000 * MIB);
            assert_eq!(report.utility.memory_used_mb, 1376.0);
        }
        assert_eq!(driver.acquired.get(), 3);
        assert_eq!(driver.released.get(), 3);
    }

    #[test]
    fn test_context_released_when_query_fails() {
        let driver = FakeDriver {
            fail_mem_info_on: Some(1),
            ..Default::default()
        };
        let err = GpuSnapshot::collect(
            &FakeRuntime { available: false },
            &FakeUtility::with_devices(3),
            &driver,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Cuda { call: "cuMemGetInfo_v2", .. }));
        assert_eq!(driver.acquired.get(), 2);
        assert_eq!(driver.released.get(), 2);
    }

    #[test]
    fn test_context_acquisition_failure_propagates() {
        let driver = FakeDriver {
            fail_context_on: Some(0),
            ..Default::default()
        };
        let err = DriverObservation::query(&driver, 0).unwrap_err();
        assert!(matches!(err, Error::Cuda { call: "cuCtxCreate_v2", .. }));
        assert_eq!(driver.acquired.get(), 0);
        assert_eq!(driver.released.get(), 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = GpuSnapshot::collect(
            &FakeRuntime { available: true },
            &FakeUtility::with_devices(2),
            &FakeDriver::default(),
        )
        .unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: GpuSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);

        let empty = GpuSnapshot::collect(&NoRuntime, &NoUtility, &NoDriver).unwrap();
        let json = serde_json::to_string(&empty).unwrap();
        assert_eq!(serde_json::from_str::<GpuSnapshot>(&json).unwrap(), empty);
    }

    #[test]
    fn test_compiled_out_layers() {
        assert!(!NoRuntime.is_available());
        assert!(NoUtility.devices().unwrap().is_empty());
        assert!(NoDriver.make_context(0).is_err());

        let snapshot = GpuSnapshot::collect(&NoRuntime, &NoUtility, &NoDriver).unwrap();
        assert_eq!(snapshot.runtime, RuntimeObservation::Unavailable);
        assert!(snapshot.devices.is_empty());
    }
}
