//! Hardware identification source
//!
//! Vendor, family, model, architecture, frequency and cache topology. On Linux
//! these come from `/proc/cpuinfo` and the sysfs cache hierarchy of `cpu0`;
//! elsewhere they are derived from the OS layer.

use crate::error::{Error, Result};
use crate::host::HostInfo;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Hardware-level CPU identity. Every field except the architecture may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuIdentity {
    /// Name of the source that produced this identity (e.g. "procfs")
    pub source: String,
    /// Brand string (e.g. "AMD Ryzen 7 5800X 8-Core Processor")
    pub brand: Option<String>,
    /// Logical processor count seen by the source
    pub count: Option<usize>,
    /// Actual clock frequency in Hz
    pub hz_actual: Option<u64>,
    /// Raw vendor id (e.g. "GenuineIntel")
    pub vendor_id: Option<String>,
    pub family: Option<u32>,
    pub model: Option<u32>,
    /// Architecture as the platform names it (e.g. "x86_64")
    pub arch_raw: String,
    /// Normalized architecture (e.g. "X86_64", "ARM_8")
    pub arch: String,
    /// L2 cache size in bytes
    pub l2_cache_size: Option<u64>,
    /// L2 cache line size in bytes
    pub l2_cache_line_size: Option<u32>,
    /// L2 cache ways of associativity
    pub l2_cache_associativity: Option<u32>,
    /// L3 cache size in bytes
    pub l3_cache_size: Option<u64>,
}

impl CpuIdentity {
    /// Identity with only the architecture filled in
    pub fn bare(source: &str) -> Self {
        let arch_raw = std::env::consts::ARCH.to_string();
        Self {
            source: source.to_string(),
            arch: normalize_arch(&arch_raw),
            arch_raw,
            ..Default::default()
        }
    }

    /// Frequency formatted the way CPU identification tools print it ("3.6000 GHz")
    pub fn hz_friendly(&self) -> Option<String> {
        self.hz_actual
            .map(|hz| format!("{:.4} GHz", hz as f64 / 1_000_000_000.0))
    }
}

/// Secondary hardware identification source consumed by the CPU probe
pub trait CpuIdentifier {
    fn identify(&self) -> Result<CpuIdentity>;
}

/// Map a platform architecture name onto the normalized family name
pub fn normalize_arch(raw: &str) -> String {
    match raw {
        "x86_64" | "amd64" | "AMD64" => "X86_64".to_string(),
        "x86" | "i386" | "i686" => "X86_32".to_string(),
        "aarch64" | "arm64" => "ARM_8".to_string(),
        "arm" | "armv7l" => "ARM_7".to_string(),
        "powerpc64" | "ppc64le" => "PPC_64".to_string(),
        "powerpc" => "PPC_32".to_string(),
        "riscv64" => "RISCV_64".to_string(),
        "s390x" => "S390X".to_string(),
        other => other.to_uppercase(),
    }
}

/// Linux `/proc/cpuinfo` + sysfs cache identification
pub struct ProcCpuInfo {
    cpuinfo_path: PathBuf,
    cache_dir: PathBuf,
}

impl ProcCpuInfo {
    pub fn new() -> Self {
        Self::with_paths("/proc/cpuinfo", "/sys/devices/system/cpu/cpu0/cache")
    }

    /// Read from alternative locations (fixtures, chroots)
    pub fn with_paths(cpuinfo_path: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cpuinfo_path: cpuinfo_path.into(),
            cache_dir: cache_dir.into(),
        }
    }
}

impl Default for ProcCpuInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuIdentifier for ProcCpuInfo {
    fn identify(&self) -> Result<CpuIdentity> {
        let content = fs::read_to_string(&self.cpuinfo_path)?;
        let mut identity = parse_cpuinfo(&content);

        match read_cache_topology(&self.cache_dir) {
            Ok(caches) => apply_caches(&mut identity, &caches),
            Err(e) => log::debug!(
                "No cache topology under {}: {}",
                self.cache_dir.display(),
                e
            ),
        }

        Ok(identity)
    }
}

/// Identification derived from the OS layer, for platforms without procfs
pub struct HostIdentifier<'a> {
    host: &'a dyn HostInfo,
}

impl<'a> HostIdentifier<'a> {
    pub fn new(host: &'a dyn HostInfo) -> Self {
        Self { host }
    }
}

impl CpuIdentifier for HostIdentifier<'_> {
    fn identify(&self) -> Result<CpuIdentity> {
        let mut identity = CpuIdentity::bare("sysinfo");
        identity.brand = Some(self.host.processor()).filter(|s| !s.is_empty());
        identity.vendor_id = Some(self.host.vendor()).filter(|s| !s.is_empty());
        identity.count = Some(self.host.logical_cores());
        identity.hz_actual = self.host.frequency_mhz().map(|mhz| mhz * 1_000_000);
        Ok(identity)
    }
}

/// Parse the first processor block of `/proc/cpuinfo`, counting all blocks
pub fn parse_cpuinfo(content: &str) -> CpuIdentity {
    let mut identity = CpuIdentity::bare("procfs");
    let mut count = 0usize;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key == "processor" && value.parse::<usize>().is_ok() {
            count += 1;
            continue;
        }
        // ARM kernels print these once, after every processor block
        if matches!(key, "Hardware" | "Processor") {
            if identity.brand.is_none() {
                identity.brand = Some(value.to_string()).filter(|s| !s.is_empty());
            }
            continue;
        }
        // Fields of later processor blocks repeat the first one
        if count > 1 {
            continue;
        }

        match key {
            "vendor_id" | "CPU implementer" if identity.vendor_id.is_none() => {
                identity.vendor_id = Some(value.to_string());
            }
            "cpu family" => identity.family = value.parse().ok(),
            "model" => identity.model = value.parse().ok(),
            "model name" | "cpu model" if identity.brand.is_none() => {
                identity.brand = Some(value.to_string()).filter(|s| !s.is_empty());
            }
            "cpu MHz" => {
                identity.hz_actual = value
                    .parse::<f64>()
                    .ok()
                    .map(|mhz| (mhz * 1_000_000.0).round() as u64);
            }
            _ => {}
        }
    }

    if count > 0 {
        identity.count = Some(count);
    }
    identity
}

/// One cache described under `cpu0/cache/index*`
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLevel {
    pub level: u32,
    pub cache_type: String,
    pub size: Option<u64>,
    pub line_size: Option<u32>,
    pub ways: Option<u32>,
}

/// Read every `index*` entry of a sysfs cache directory
pub fn read_cache_topology(cache_dir: &Path) -> Result<Vec<CacheLevel>> {
    let mut caches = Vec::new();

    for entry in fs::read_dir(cache_dir)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with("index") {
            continue;
        }
        let dir = entry.path();

        let level = read_trimmed(&dir.join("level"))?
            .parse()
            .map_err(|e| Error::Parse(format!("cache level in {}: {}", dir.display(), e)))?;
        let cache_type = read_trimmed(&dir.join("type")).unwrap_or_default();
        let size = read_trimmed(&dir.join("size"))
            .ok()
            .and_then(|s| parse_cache_size(&s));
        let line_size = read_trimmed(&dir.join("coherency_line_size"))
            .ok()
            .and_then(|s| s.parse().ok());
        let ways = read_trimmed(&dir.join("ways_of_associativity"))
            .ok()
            .and_then(|s| s.parse().ok());

        caches.push(CacheLevel {
            level,
            cache_type,
            size,
            line_size,
            ways,
        });
    }

    caches.sort_by_key(|c| c.level);
    Ok(caches)
}

fn apply_caches(identity: &mut CpuIdentity, caches: &[CacheLevel]) {
    let unified = |level: u32| {
        caches
            .iter()
            .find(|c| c.level == level && c.cache_type != "Instruction")
    };

    if let Some(l2) = unified(2) {
        identity.l2_cache_size = l2.size;
        identity.l2_cache_line_size = l2.line_size;
        identity.l2_cache_associativity = l2.ways;
    }
    if let Some(l3) = unified(3) {
        identity.l3_cache_size = l3.size;
    }
}

/// Parse sysfs cache sizes such as "512K", "8M" or "1024"
pub fn parse_cache_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let (digits, multiplier) = match s.chars().last()? {
        'K' | 'k' => (&s[..s.len() - 1], 1024),
        'M' | 'm' => (&s[..s.len() - 1], 1024 * 1024),
        'G' | 'g' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    digits.trim().parse::<u64>().ok().map(|n| n * multiplier)
}

fn read_trimmed(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}
