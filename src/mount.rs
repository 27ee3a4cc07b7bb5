//! Mount table (§4.9, ambient): physical-disk identification and
//! reflink-capability reporting. Grounded on `df/core.rs`'s
//! `/proc/mounts` parsing and `statvfs`-adjacent device lookups.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiskId(pub u64);

pub trait MountTable: Send + Sync {
    fn disk_id(&self, dev: u64) -> DiskId;
    fn is_nonrotational(&self, disk: DiskId) -> bool;
    /// Reported but never exercised by the core (§4.9): reflink cloning
    /// is a deletion-policy concern, out of scope per §1 Non-goals.
    fn can_reflink(&self, src: DiskId, dst: DiskId) -> bool;
}

/// A parsed mount entry from /proc/mounts (mirrors `df::core::MountEntry`).
struct MountEntry {
    source: String,
    target: String,
}

fn read_mounts() -> Vec<MountEntry> {
    let content = fs::read_to_string("/proc/mounts")
        .or_else(|_| fs::read_to_string("/etc/mtab"))
        .unwrap_or_default();
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                Some(MountEntry {
                    source: parts[0].to_string(),
                    target: parts[1].to_string(),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Maps `st_dev` values that share a `/sys/block` parent device to one
/// `DiskId` (partitions of one physical disk collapse together), and
/// falls back to one `DiskId` per raw `st_dev` when `/sys/block` is
/// unavailable (non-Linux, containers without sysfs).
pub struct DefaultMountTable {
    dev_to_disk: HashMap<u64, DiskId>,
    nonrotational: HashMap<DiskId, bool>,
}

impl DefaultMountTable {
    pub fn discover() -> Self {
        let mut dev_to_disk = HashMap::new();
        let mut nonrotational = HashMap::new();

        for entry in read_mounts() {
            let Ok(meta) = fs::metadata(&entry.target) else {
                continue;
            };
            let dev = meta.dev();
            if dev_to_disk.contains_key(&dev) {
                continue;
            }
            let parent_name = block_parent_name(&entry.source);
            let disk_id = DiskId(stable_hash(parent_name.as_deref().unwrap_or(&entry.source)));
            dev_to_disk.insert(dev, disk_id);
            nonrotational
                .entry(disk_id)
                .or_insert_with(|| parent_name.as_deref().is_some_and(is_nonrotational_block));
        }

        DefaultMountTable {
            dev_to_disk,
            nonrotational,
        }
    }
}

impl MountTable for DefaultMountTable {
    fn disk_id(&self, dev: u64) -> DiskId {
        self.dev_to_disk.get(&dev).copied().unwrap_or(DiskId(dev))
    }

    fn is_nonrotational(&self, disk: DiskId) -> bool {
        self.nonrotational.get(&disk).copied().unwrap_or(false)
    }

    fn can_reflink(&self, src: DiskId, dst: DiskId) -> bool {
        src == dst
    }
}

/// `/dev/sda1` -> `Some("sda")`, i.e. the `/sys/block` entry a partition
/// belongs to. Best-effort string parsing, consistent with the teacher's
/// preference for direct parsing over pulling in a block-device crate.
fn block_parent_name(source: &str) -> Option<String> {
    let name = source.strip_prefix("/dev/")?;
    if Path::new("/sys/block").join(name).exists() {
        return Some(name.to_string());
    }
    // Partition device (sda1, nvme0n1p1) -> strip the trailing partition
    // number to find the whole-disk entry in /sys/block.
    let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let trimmed = trimmed.strip_suffix('p').unwrap_or(trimmed);
    if trimmed != name && Path::new("/sys/block").join(trimmed).exists() {
        return Some(trimmed.to_string());
    }
    None
}

fn is_nonrotational_block(name: &str) -> bool {
    fs::read_to_string(format!("/sys/block/{name}/queue/rotational"))
        .map(|s| s.trim() == "0")
        .unwrap_or(false)
}

fn stable_hash(s: &str) -> u64 {
    let mut h: u64 = 1469598103934665603;
    for b in s.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    h
}
