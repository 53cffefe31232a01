// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! NVIDIA vendor utility via NVML
//!
//! Enumerates GPUs the way `nvidia-smi` sees them and reports per-device
//! memory in MiB. When NVML cannot be initialised (no driver, no library)
//! the utility reports no devices.

use crate::error::Result;
use crate::gpu::traits::{GpuUtility, UtilityObservation};
use nvml_wrapper::Nvml;

const BYTES_PER_MIB: f64 = (1u64 << 20) as f64;

/// NVML-backed [`GpuUtility`]
pub struct NvmlUtility {
    nvml: Option<Nvml>,
}

impl NvmlUtility {
    /// Initialise NVML; failure leaves the utility without devices
    pub fn new() -> Self {
        let nvml = match Nvml::init() {
            Ok(nvml) => Some(nvml),
            Err(e) => {
                log::warn!("NVML unavailable, no GPUs will be enumerated: {}", e);
                None
            }
        };
        Self { nvml }
    }
}

impl Default for NvmlUtility {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuUtility for NvmlUtility {
    fn devices(&self) -> Result<Vec<UtilityObservation>> {
        let Some(nvml) = &self.nvml else {
            return Ok(Vec::new());
        };

        let count = nvml.device_count()?;
        let mut devices = Vec::with_capacity(count as usize);
        for index in 0..count {
            let device = nvml.device_by_index(index)?;
            let memory = device.memory_info()?;
            devices.push(UtilityObservation {
                id: index,
                name: device.name()?,
                memory_total_mb: memory.total as f64 / BYTES_PER_MIB,
                memory_free_mb: memory.free as f64 / BYTES_PER_MIB,
                memory_used_mb: memory.used as f64 / BYTES_PER_MIB,
            });
        }

        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate_nvidia_gpus() {
        // Without NVML the list is empty, so an error here is a real query failure
        let devices = NvmlUtility::new()
            .devices()
            .expect("NVML device query failed after init");
        for (index, device) in devices.iter().enumerate() {
            assert_eq!(device.id as usize, index);
            assert!(device.memory_used_mb <= device.memory_total_mb);
        }
    }

    #[test]
    fn test_uninitialised_nvml_reports_no_devices() {
        let utility = NvmlUtility { nvml: None };
        assert!(utility.devices().unwrap().is_empty());
    }
}
