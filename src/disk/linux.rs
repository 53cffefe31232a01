//! Linux partitions via procfs and statvfs

use crate::disk::traits::*;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

/// Filesystems without a `/proc/filesystems` entry that still live on a device
const EXTRA_PHYSICAL_FS: &[&str] = &["zfs"];

/// Mounted partitions read from `/proc/mounts`
pub struct MountTable {
    mounts_path: PathBuf,
    filesystems_path: PathBuf,
}

impl MountTable {
    pub fn new() -> Self {
        Self::with_paths("/proc/mounts", "/proc/filesystems")
    }

    /// Read from alternative locations (fixtures, chroots)
    pub fn with_paths(mounts_path: impl Into<PathBuf>, filesystems_path: impl Into<PathBuf>) -> Self {
        Self {
            mounts_path: mounts_path.into(),
            filesystems_path: filesystems_path.into(),
        }
    }

    /// Filesystem types backed by a block device, or `None` if unknown
    fn physical_filesystems(&self) -> Option<HashSet<String>> {
        match fs::read_to_string(&self.filesystems_path) {
            Ok(content) => Some(parse_physical_filesystems(&content)),
            Err(e) => {
                log::debug!(
                    "Failed to read {}: {}; keeping every mount",
                    self.filesystems_path.display(),
                    e
                );
                None
            }
        }
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionSource for MountTable {
    fn partitions(&self) -> Result<Vec<Partition>> {
        let mounts = fs::read_to_string(&self.mounts_path)?;
        let physical = self.physical_filesystems();

        Ok(parse_mounts(&mounts)
            .into_iter()
            .filter(|p| {
                physical
                    .as_ref()
                    .map_or(true, |fs_types| fs_types.contains(&p.fstype))
            })
            .collect())
    }

    fn usage(&self, mountpoint: &str) -> Result<DiskUsage> {
        let stat = nix::sys::statvfs::statvfs(mountpoint).map_err(|errno| match errno {
            nix::Error::EACCES | nix::Error::EPERM => Error::PermissionDenied(mountpoint.to_string()),
            other => Error::Nix(other),
        })?;

        let frsize = stat.fragment_size() as u64;
        let blocks = stat.blocks() as u64;
        let total = blocks * frsize;
        let free = stat.blocks_available() as u64 * frsize;
        let used = blocks.saturating_sub(stat.blocks_free() as u64) * frsize;

        Ok(DiskUsage::new(total, used, free))
    }
}

/// Parse `/proc/mounts` lines into partitions
pub fn parse_mounts(content: &str) -> Vec<Partition> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mountpoint = fields.next()?;
            let fstype = fields.next()?;
            Some(Partition {
                device: unescape_octal(device),
                mountpoint: unescape_octal(mountpoint),
                fstype: fstype.to_string(),
            })
        })
        .collect()
}

/// Filesystem types in `/proc/filesystems` not flagged `nodev`
pub fn parse_physical_filesystems(content: &str) -> HashSet<String> {
    let mut fs_types: HashSet<String> = content
        .lines()
        .filter(|line| !line.starts_with("nodev"))
        .map(|line| line.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    fs_types.extend(EXTRA_PHYSICAL_FS.iter().map(|s| s.to_string()));
    fs_types
}

/// Decode the `\ooo` escapes the kernel uses for whitespace in mount fields
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
