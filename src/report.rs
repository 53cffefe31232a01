//! Console report formatting
//!
//! Renders snapshots as the human-oriented text report: a banner per
//! component, a caption per source, and tab-indented fields between dashed
//! separators. Missing values print as [`PLACEHOLDER`].

use crate::cpu::CpuSnapshot;
use crate::disk::{DiskSnapshot, PartitionUsage};
use crate::gpu::{GpuSnapshot, RuntimeObservation};
use crate::memory::MemorySnapshot;
use std::fmt::Display;
use std::io::{self, Write};

/// Printed in place of a value a source did not provide
pub const PLACEHOLDER: &str = "-";

const BYTES_PER_MB: f64 = (1u64 << 20) as f64;
const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

const CPU_BANNER: &[&str] = &[
    r"       ____ ____  _   _",
    r"      / ___|  _ \| | | |",
    r"     | |   | |_) | | | |",
    r"     | |___|  __/| |_| |",
    r"      \____|_|    \___/",
];

const RAM_BANNER: &[&str] = &[
    r"      ____      _    __  __",
    r"     |  _ \    / \  |  \/  |",
    r"     | |_) |  / _ \ | |\/| |",
    r"     |  _ <  / ___ \| |  | |",
    r"     |_| \_\/_/   \_\_|  |_|",
];

const DISK_BANNER: &[&str] = &[
    r"      ____ ___ ____  _  __",
    r"     |  _ \_ _/ ___|| |/ /",
    r"     | | | | |\___ \| ' / ",
    r"     | |_| | | ___) | . \ ",
    r"     |____/___|____/|_|\_\",
];

const GPU_BANNER: &[&str] = &[
    r"   ____ ____  _   _ ",
    r"  / ___|  _ \| | | |",
    r" | |  _| |_) | | | |",
    r" | |_| |  __/| |_| |",
    r"  \____|_|    \___/ ",
];

fn banner(out: &mut dyn Write, art: &[&str]) -> io::Result<()> {
    writeln!(out, "{}", "=".repeat(50))?;
    for line in art {
        writeln!(out, "{}", line)?;
    }
    writeln!(out, "{}", "=".repeat(50))
}

fn caption(out: &mut dyn Write, text: &str) -> io::Result<()> {
    writeln!(out, "\n{}\n", text)
}

fn separator(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "\t{}", "-".repeat(25))
}

fn or_placeholder<T: Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

fn non_empty(value: &str) -> &str {
    if value.is_empty() {
        PLACEHOLDER
    } else {
        value
    }
}

/// Print the CPU banner, the OS-layer section and the identification section
pub fn write_cpu(out: &mut dyn Write, cpu: &CpuSnapshot) -> io::Result<()> {
    banner(out, CPU_BANNER)?;

    caption(out, "OS (sysinfo)")?;
    separator(out)?;
    writeln!(out, "\tProcessor Info: {}", non_empty(&cpu.os.processor))?;
    writeln!(out, "\tPhysical cores: {}", or_placeholder(&cpu.os.physical_cores))?;
    writeln!(out, "\tLogical cores: {}", cpu.os.logical_cores)?;
    separator(out)?;

    let id = &cpu.identity;
    caption(
        out,
        &format!(
            "CPU identification: {} (hwcheck {})",
            id.source,
            crate::VERSION
        ),
    )?;
    separator(out)?;
    writeln!(out, "\tCPU: {}", or_placeholder(&id.brand))?;
    writeln!(out, "\tLogical cores: {}", or_placeholder(&id.count))?;
    writeln!(
        out,
        "\tHz: {}, {}",
        or_placeholder(&id.hz_friendly()),
        or_placeholder(&id.hz_actual)
    )?;
    writeln!(
        out,
        "\tVendor: {} Family: {} Model: {} Arch: {}, {}",
        or_placeholder(&id.vendor_id),
        or_placeholder(&id.family),
        or_placeholder(&id.model),
        non_empty(&id.arch_raw),
        non_empty(&id.arch)
    )?;
    writeln!(
        out,
        "\tL2 Cache: {} Line Size: {} Associativity {}",
        or_placeholder(&id.l2_cache_size),
        or_placeholder(&id.l2_cache_line_size),
        or_placeholder(&id.l2_cache_associativity)
    )?;
    writeln!(out, "\tL3 Cache: {}", or_placeholder(&id.l3_cache_size))?;
    separator(out)?;
    writeln!(out)
}

/// Print the RAM banner and total memory in GB
pub fn write_memory(out: &mut dyn Write, memory: &MemorySnapshot) -> io::Result<()> {
    banner(out, RAM_BANNER)?;

    caption(out, "OS (sysinfo)")?;
    separator(out)?;
    writeln!(out, "\tTotal RAM: {:.2} GB", memory.total_gb())?;
    separator(out)?;
    writeln!(out)
}

/// Print the disk banner and one block per partition, inaccessible ones inline
pub fn write_disk(out: &mut dyn Write, disk: &DiskSnapshot) -> io::Result<()> {
    banner(out, DISK_BANNER)?;

    caption(out, "Partitions")?;
    separator(out)?;
    for report in &disk.partitions {
        let partition = &report.partition;
        writeln!(out, "\tDevice: {}", partition.device)?;
        writeln!(out, "\t\tMountpoint: {}", partition.mountpoint)?;
        writeln!(out, "\t\tFile system type: {}", partition.fstype)?;
        match &report.usage {
            PartitionUsage::Available(usage) => {
                writeln!(out, "\t\tTotal Size: {:.2} GiB", usage.total as f64 / BYTES_PER_GIB)?;
                writeln!(out, "\t\tFree: {:.2} GiB", usage.free as f64 / BYTES_PER_GIB)?;
                writeln!(out, "\t\tUsed: {:.2} GiB", usage.used as f64 / BYTES_PER_GIB)?;
                writeln!(out, "\t\tPercentage: {:.1}%", usage.percent)?;
            }
            PartitionUsage::Inaccessible => {
                writeln!(
                    out,
                    "\t\tCould not access statistics for {}",
                    partition.mountpoint
                )?;
            }
        }
        writeln!(out)?;
    }
    separator(out)?;
    writeln!(out)
}

/// Print the GPU banner, the runtime section, then NVML and driver figures per device
pub fn write_gpu(out: &mut dyn Write, gpu: &GpuSnapshot) -> io::Result<()> {
    banner(out, GPU_BANNER)?;

    caption(out, "CUDA runtime")?;
    separator(out)?;
    match &gpu.runtime {
        RuntimeObservation::Available {
            version,
            device_name,
            total_bytes,
            allocated_bytes,
        } => {
            let total = *total_bytes as f64 / BYTES_PER_MB;
            let allocated = *allocated_bytes as f64 / BYTES_PER_MB;
            writeln!(out, "\tVersion: {}", version)?;
            writeln!(out, "\tGPU Device Name: {}", device_name)?;
            writeln!(out, "\tTotal VRAM: {:.2} MB", total)?;
            writeln!(out, "\tFree VRAM: {:.2} MB", total - allocated)?;
            writeln!(out, "\tDevice Allocated VRAM: {:.2} MB", allocated)?;
        }
        RuntimeObservation::Unavailable => {
            writeln!(out, "\tNo CUDA runtime available")?;
        }
    }
    separator(out)?;

    for device in &gpu.devices {
        let utility = &device.utility;
        caption(out, "NVML")?;
        separator(out)?;
        writeln!(out, "\tGPU ID: {}, \t Name: {}", utility.id, utility.name)?;
        writeln!(out, "\tTotal VRAM: {:.1} MB", utility.memory_total_mb)?;
        writeln!(out, "\tFree VRAM: {:.1} MB", utility.memory_free_mb)?;
        writeln!(out, "\tUsed VRAM: {:.1} MB", utility.memory_used_mb)?;
        separator(out)?;

        let driver = &device.driver;
        caption(out, "CUDA driver")?;
        separator(out)?;
        writeln!(out, "\tTotal VRAM: {} MB", driver.total_bytes >> 20)?;
        writeln!(out, "\tFree VRAM: {} MB", driver.free_bytes >> 20)?;
        writeln!(out, "\tUsed VRAM: {} MB", driver.used_bytes >> 20)?;
        separator(out)?;
    }

    Ok(())
}
