// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! CUDA runtime and driver backends
//!
//! Both libraries are opened at runtime with `libloading`, the same way
//! `nvml-wrapper` opens NVML, so the binary runs on hosts without CUDA. A
//! library that fails to load turns into an unavailable runtime, or into
//! [`Error::Library`] on the first driver call.

use crate::error::{Error, Result};
use crate::gpu::traits::{ComputeDriver, ComputeRuntime, DeviceContext};
use libloading::Library;
use std::ffi::{c_int, c_uint, c_void, CStr};
use std::ptr;

#[cfg(windows)]
const RUNTIME_LIBRARIES: &[&str] = &["cudart64_12.dll", "cudart64_110.dll", "cudart64_102.dll"];
#[cfg(not(windows))]
const RUNTIME_LIBRARIES: &[&str] = &["libcudart.so", "libcudart.so.12", "libcudart.so.11.0"];

#[cfg(windows)]
const DRIVER_LIBRARIES: &[&str] = &["nvcuda.dll"];
#[cfg(not(windows))]
const DRIVER_LIBRARIES: &[&str] = &["libcuda.so.1", "libcuda.so"];

/// Status code shared by `cudaError_t` and `CUresult` for success
const SUCCESS: c_int = 0;

/// Leading `char name[256]` of `cudaDeviceProp`
const DEVICE_NAME_LEN: usize = 256;

/// Room for `cudaDeviceProp` of every released toolkit, in u64 words
const DEVICE_PROP_WORDS: usize = 1024;

type CuContext = *mut c_void;

fn open_first(names: &[&str]) -> Result<Library> {
    let mut last_error = None;
    for name in names {
        // SAFETY: loading the CUDA libraries runs only their own initialisers
        match unsafe { Library::new(name) } {
            Ok(lib) => {
                log::debug!("Loaded {}", name);
                return Ok(lib);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(Error::Library(match last_error {
        Some(e) => e.to_string(),
        None => "no candidate library names".to_string(),
    }))
}

/// Copy a function pointer out of the library
///
/// # Safety
/// `T` must match the C signature of the exported symbol.
unsafe fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);
    lib.get::<T>(&bytes)
        .map(|sym| *sym)
        .map_err(|e| Error::Library(format!("{}: {}", name, e)))
}

fn check(call: &'static str, code: c_int) -> Result<()> {
    if code == SUCCESS {
        Ok(())
    } else {
        Err(Error::Cuda { call, code })
    }
}

/// Format a packed CUDA version (`1000 * major + 10 * minor`)
pub fn format_version(packed: i32) -> String {
    format!("{}.{}", packed / 1000, (packed % 1000) / 10)
}

struct RuntimeApi {
    // Keeps the function pointers below valid
    _lib: Library,
    runtime_get_version: unsafe extern "C" fn(*mut c_int) -> c_int,
    get_device_count: unsafe extern "C" fn(*mut c_int) -> c_int,
    get_device: unsafe extern "C" fn(*mut c_int) -> c_int,
    set_device: unsafe extern "C" fn(c_int) -> c_int,
    get_device_properties: unsafe extern "C" fn(*mut c_void, c_int) -> c_int,
    mem_get_info: unsafe extern "C" fn(*mut usize, *mut usize) -> c_int,
}

impl RuntimeApi {
    fn load() -> Result<Self> {
        let lib = open_first(RUNTIME_LIBRARIES)?;
        // SAFETY: signatures follow cuda_runtime_api.h
        unsafe {
            let get_device_properties = symbol(&lib, "cudaGetDeviceProperties_v2")
                .or_else(|_| symbol(&lib, "cudaGetDeviceProperties"))?;
            Ok(Self {
                runtime_get_version: symbol(&lib, "cudaRuntimeGetVersion")?,
                get_device_count: symbol(&lib, "cudaGetDeviceCount")?,
                get_device: symbol(&lib, "cudaGetDevice")?,
                set_device: symbol(&lib, "cudaSetDevice")?,
                get_device_properties,
                mem_get_info: symbol(&lib, "cudaMemGetInfo")?,
                _lib: lib,
            })
        }
    }

    fn device_count(&self) -> Result<u32> {
        let mut count: c_int = 0;
        check("cudaGetDeviceCount", unsafe { (self.get_device_count)(&mut count) })?;
        Ok(count.max(0) as u32)
    }

    /// `(free, total)` bytes on `device`, which becomes the current device
    fn mem_info(&self, device: u32) -> Result<(u64, u64)> {
        check("cudaSetDevice", unsafe { (self.set_device)(device as c_int) })?;
        let (mut free, mut total) = (0usize, 0usize);
        check("cudaMemGetInfo", unsafe {
            (self.mem_get_info)(&mut free, &mut total)
        })?;
        Ok((free as u64, total as u64))
    }
}

/// CUDA runtime library (`libcudart`) as a [`ComputeRuntime`]
pub struct CudaRuntime {
    api: Option<RuntimeApi>,
}

impl CudaRuntime {
    /// Load the runtime library; a missing library yields an unavailable runtime
    pub fn new() -> Self {
        let api = RuntimeApi::load()
            .map_err(|e| log::debug!("CUDA runtime not loaded: {}", e))
            .ok();
        Self { api }
    }

    fn api(&self) -> Result<&RuntimeApi> {
        self.api
            .as_ref()
            .ok_or_else(|| Error::NotSupported("CUDA runtime library not loaded".to_string()))
    }
}

impl Default for CudaRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeRuntime for CudaRuntime {
    fn is_available(&self) -> bool {
        match self.api().and_then(RuntimeApi::device_count) {
            Ok(count) => count > 0,
            Err(e) => {
                log::debug!("CUDA runtime unavailable: {}", e);
                false
            }
        }
    }

    fn version(&self) -> Result<String> {
        let api = self.api()?;
        let mut version: c_int = 0;
        check("cudaRuntimeGetVersion", unsafe {
            (api.runtime_get_version)(&mut version)
        })?;
        Ok(format_version(version))
    }

    fn current_device(&self) -> Result<u32> {
        let api = self.api()?;
        let mut device: c_int = 0;
        check("cudaGetDevice", unsafe { (api.get_device)(&mut device) })?;
        Ok(device.max(0) as u32)
    }

    fn device_name(&self, device: u32) -> Result<String> {
        let api = self.api()?;
        let mut props = vec![0u64; DEVICE_PROP_WORDS];
        check("cudaGetDeviceProperties", unsafe {
            (api.get_device_properties)(props.as_mut_ptr().cast(), device as c_int)
        })?;

        let bytes: Vec<u8> = props
            .iter()
            .flat_map(|word| word.to_ne_bytes())
            .take(DEVICE_NAME_LEN)
            .collect();
        let name = CStr::from_bytes_until_nul(&bytes)
            .map_err(|e| Error::Parse(format!("device name: {}", e)))?;
        Ok(name.to_string_lossy().into_owned())
    }

    fn total_memory(&self, device: u32) -> Result<u64> {
        Ok(self.api()?.mem_info(device)?.1)
    }

    // cudaMemGetInfo is device-wide; the runtime keeps no per-process tally
    fn memory_allocated(&self, device: u32) -> Result<u64> {
        let (free, total) = self.api()?.mem_info(device)?;
        Ok(total.saturating_sub(free))
    }
}

struct DriverApi {
    // Keeps the function pointers below valid
    _lib: Library,
    device_get: unsafe extern "C" fn(*mut c_int, c_int) -> c_int,
    device_total_mem: unsafe extern "C" fn(*mut usize, c_int) -> c_int,
    ctx_create: unsafe extern "C" fn(*mut CuContext, c_uint, c_int) -> c_int,
    ctx_pop_current: unsafe extern "C" fn(*mut CuContext) -> c_int,
    ctx_destroy: unsafe extern "C" fn(CuContext) -> c_int,
    mem_get_info: unsafe extern "C" fn(*mut usize, *mut usize) -> c_int,
}

impl DriverApi {
    fn load() -> Result<Self> {
        let lib = open_first(DRIVER_LIBRARIES)?;
        // SAFETY: signatures follow cuda.h
        let api = unsafe {
            let init: unsafe extern "C" fn(c_uint) -> c_int = symbol(&lib, "cuInit")?;
            check("cuInit", init(0))?;
            Self {
                device_get: symbol(&lib, "cuDeviceGet")?,
                device_total_mem: symbol(&lib, "cuDeviceTotalMem_v2")?,
                ctx_create: symbol(&lib, "cuCtxCreate_v2")?,
                ctx_pop_current: symbol(&lib, "cuCtxPopCurrent_v2")?,
                ctx_destroy: symbol(&lib, "cuCtxDestroy_v2")?,
                mem_get_info: symbol(&lib, "cuMemGetInfo_v2")?,
                _lib: lib,
            }
        };
        Ok(api)
    }

    fn device(&self, ordinal: u32) -> Result<c_int> {
        let mut device: c_int = 0;
        check("cuDeviceGet", unsafe {
            (self.device_get)(&mut device, ordinal as c_int)
        })?;
        Ok(device)
    }
}

/// CUDA driver library (`libcuda`) as a [`ComputeDriver`]
pub struct CudaDriver {
    api: std::result::Result<DriverApi, String>,
}

impl CudaDriver {
    /// Load and initialise the driver; failures surface on first use
    pub fn new() -> Self {
        Self {
            api: DriverApi::load().map_err(|e| e.to_string()),
        }
    }

    fn api(&self) -> Result<&DriverApi> {
        self.api
            .as_ref()
            .map_err(|msg| Error::Library(format!("CUDA driver: {}", msg)))
    }
}

impl Default for CudaDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeDriver for CudaDriver {
    fn total_memory(&self, ordinal: u32) -> Result<u64> {
        let api = self.api()?;
        let device = api.device(ordinal)?;
        let mut bytes = 0usize;
        check("cuDeviceTotalMem_v2", unsafe {
            (api.device_total_mem)(&mut bytes, device)
        })?;
        Ok(bytes as u64)
    }

    fn make_context(&self, ordinal: u32) -> Result<Box<dyn DeviceContext + '_>> {
        let api = self.api()?;
        let device = api.device(ordinal)?;
        let mut ctx: CuContext = ptr::null_mut();
        check("cuCtxCreate_v2", unsafe { (api.ctx_create)(&mut ctx, 0, device) })?;
        Ok(Box::new(CudaContext { api, ctx }))
    }
}

/// Context created by `cuCtxCreate`; popped and destroyed on drop
struct CudaContext<'a> {
    api: &'a DriverApi,
    ctx: CuContext,
}

impl DeviceContext for CudaContext<'_> {
    fn mem_get_info(&self) -> Result<(u64, u64)> {
        let (mut free, mut total) = (0usize, 0usize);
        check("cuMemGetInfo_v2", unsafe {
            (self.api.mem_get_info)(&mut free, &mut total)
        })?;
        Ok((free as u64, total as u64))
    }
}

impl Drop for CudaContext<'_> {
    fn drop(&mut self) {
        let mut popped: CuContext = ptr::null_mut();
        let pop = unsafe { (self.api.ctx_pop_current)(&mut popped) };
        if pop != SUCCESS {
            log::warn!("cuCtxPopCurrent_v2 failed with status {}", pop);
        }
        let destroy = unsafe { (self.api.ctx_destroy)(self.ctx) };
        if destroy != SUCCESS {
            log::warn!("cuCtxDestroy_v2 failed with status {}", destroy);
        }
    }
}
