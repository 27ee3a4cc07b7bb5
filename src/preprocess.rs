//! Preprocessor (ambient): size-bucketing, hardlink clustering, xattr
//! digest-cache reads, and the lint checks (§4.10). Hardlink tracking is
//! grounded on `du/core.rs`'s `seen_inodes: HashSet<(u64, u64)>` pattern;
//! UID/GID and ELF parsing are grounded on `stat/core.rs`'s direct
//! byte-level field reads rather than pulling in a passwd or ELF crate.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use rayon::prelude::*;

use crate::logger::Logger;
use crate::mount::MountTable;
use crate::record::{Cluster, FileRecord, LintFinding};
use crate::trie::PathTrie;
use crate::xattr_cache::XattrCache;

pub struct PreprocessOpts {
    pub read_ext_cksum_xattr: bool,
    pub detect_lint: bool,
}

impl Default for PreprocessOpts {
    fn default() -> Self {
        PreprocessOpts {
            read_ext_cksum_xattr: false,
            detect_lint: true,
        }
    }
}

pub struct PreprocessOutput {
    /// Size buckets, each containing the clusters that share that size.
    pub size_buckets: HashMap<u64, Vec<Cluster>>,
    pub lint_findings: Vec<LintFinding>,
}

pub struct Preprocessor<V> {
    mount_table: Arc<dyn MountTable>,
    trie: Arc<PathTrie<V>>,
    logger: Arc<dyn Logger>,
    owners: OwnerSnapshot,
}

impl<V: Clone + Default> Preprocessor<V> {
    pub fn new(mount_table: Arc<dyn MountTable>, trie: Arc<PathTrie<V>>, logger: Arc<dyn Logger>) -> Self {
        Preprocessor {
            mount_table,
            trie,
            logger,
            owners: OwnerSnapshot::load(),
        }
    }

    pub fn run(
        &self,
        entries: impl Iterator<Item = crate::traverse::RawEntry>,
        opts: &PreprocessOpts,
    ) -> PreprocessOutput {
        let mut by_size: HashMap<u64, Vec<FileRecord>> = HashMap::new();
        let mut empty_dirs_pending: HashSet<PathBuf> = HashSet::new();
        let mut nonempty_dirs: HashSet<PathBuf> = HashSet::new();
        let mut findings = Vec::new();
        let xattr_cache = XattrCache::new(opts.read_ext_cksum_xattr);

        for entry in entries {
            if entry.is_dir {
                empty_dirs_pending.insert(entry.path.clone());
                if let Some(parent) = entry.path.parent() {
                    nonempty_dirs.insert(parent.to_path_buf());
                }
                continue;
            }
            if let Some(parent) = entry.path.parent() {
                nonempty_dirs.insert(parent.to_path_buf());
            }

            if opts.detect_lint {
                self.lint_one(&entry, &mut findings);
            }

            if entry.size == 0 {
                findings.push(LintFinding::EmptyFile(entry.path.clone()));
            }

            let node = self.trie.search(&entry.path).unwrap_or_else(|| self.trie.insert(&entry.path));
            let disk_id = self.mount_table.disk_id(entry.dev);
            let mut record = FileRecord::new(
                node,
                entry.path.clone(),
                entry.dev,
                disk_id,
                entry.ino,
                entry.size,
                entry.mtime,
            );
            record.is_symlink = entry.is_symlink;
            record.hidden = entry.is_hidden;
            record.outer_link_count = entry.nlink;
            record.cached_digest = xattr_cache.read(&entry.path);
            by_size.entry(entry.size).or_default().push(record);
        }

        if opts.detect_lint {
            for dir in &empty_dirs_pending {
                if !nonempty_dirs.contains(dir) {
                    findings.push(LintFinding::EmptyDirectory(dir.clone()));
                }
            }
        }

        // Each bucket's hardlink clustering is independent of every other
        // bucket's, so this fans out across rayon's global pool rather
        // than clustering one bucket at a time on the caller's thread.
        let size_buckets: HashMap<u64, Vec<Cluster>> = by_size
            .into_par_iter()
            .map(|(size, records)| (size, cluster_hardlinks(records)))
            .collect();

        PreprocessOutput {
            size_buckets,
            lint_findings: findings,
        }
    }

    fn lint_one(&self, entry: &crate::traverse::RawEntry, findings: &mut Vec<LintFinding>) {
        if entry.is_symlink {
            if fs::metadata(&entry.path).is_err() {
                findings.push(LintFinding::DanglingSymlink(entry.path.clone()));
            }
            return;
        }
        if let Ok(meta) = fs::symlink_metadata(&entry.path) {
            if !self.owners.knows_uid(meta.uid()) || !self.owners.knows_gid(meta.gid()) {
                findings.push(LintFinding::BadOwner {
                    path: entry.path.clone(),
                    uid: meta.uid(),
                    gid: meta.gid(),
                });
            }
        }
        if is_non_stripped_elf(&entry.path) {
            findings.push(LintFinding::NonStrippedBinary(entry.path.clone()));
        }
    }
}

/// Clusters files sharing a `(dev, ino)` pair — the `du/core.rs`
/// `seen_inodes` idea, generalized from "skip the duplicate" to "bundle
/// the duplicate" since the shred engine must still account for bundled
/// link counts (§4.6 `outer_link_count`).
fn cluster_hardlinks(records: Vec<FileRecord>) -> Vec<Cluster> {
    let mut by_inode: HashMap<(u64, u64), Vec<FileRecord>> = HashMap::new();
    for record in records {
        by_inode.entry((record.dev, record.ino)).or_default().push(record);
    }
    by_inode
        .into_values()
        .map(|mut group| {
            let representative = group.remove(0);
            Cluster {
                representative,
                members: group,
                resolved_digest: None,
            }
        })
        .collect()
}

fn is_non_stripped_elf(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    if bytes.len() < 64 || &bytes[0..4] != b"\x7fELF" {
        return false;
    }
    let is_64bit = bytes[4] == 2;
    let is_little_endian = bytes[5] == 1;
    if !is_little_endian {
        return false;
    }
    let (shoff, shentsize, shnum, shstrndx) = if is_64bit {
        (
            u64::from_le_bytes(bytes[40..48].try_into().unwrap_or_default()) as usize,
            u16::from_le_bytes(bytes[58..60].try_into().unwrap_or_default()) as usize,
            u16::from_le_bytes(bytes[60..62].try_into().unwrap_or_default()) as usize,
            u16::from_le_bytes(bytes[62..64].try_into().unwrap_or_default()) as usize,
        )
    } else {
        if bytes.len() < 52 {
            return false;
        }
        (
            u32::from_le_bytes(bytes[32..36].try_into().unwrap_or_default()) as usize,
            u16::from_le_bytes(bytes[46..48].try_into().unwrap_or_default()) as usize,
            u16::from_le_bytes(bytes[48..50].try_into().unwrap_or_default()) as usize,
            u16::from_le_bytes(bytes[50..52].try_into().unwrap_or_default()) as usize,
        )
    };
    if shentsize == 0 || shnum == 0 || shstrndx >= shnum {
        return false;
    }
    let strtab_hdr_off = shoff + shstrndx * shentsize;
    if strtab_hdr_off + shentsize > bytes.len() {
        return false;
    }
    let name_off_field = if is_64bit { 24 } else { 16 };
    let size_off_field = if is_64bit { 32 } else { 20 };
    let Some(strtab_off) = read_u64_field(&bytes, strtab_hdr_off + name_off_field, is_64bit) else {
        return false;
    };
    let Some(strtab_size) = read_u64_field(&bytes, strtab_hdr_off + size_off_field, is_64bit) else {
        return false;
    };
    let strtab_off = strtab_off as usize;
    let strtab_end = strtab_off + strtab_size as usize;
    if strtab_end > bytes.len() {
        return false;
    }

    for i in 0..shnum {
        let hdr_off = shoff + i * shentsize;
        if hdr_off + shentsize > bytes.len() {
            break;
        }
        let Some(name_off) = read_u32_field(&bytes, hdr_off, is_64bit) else {
            continue;
        };
        let name_off = strtab_off + name_off as usize;
        if name_off >= strtab_end {
            continue;
        }
        let name_bytes = &bytes[name_off..strtab_end];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        if &name_bytes[..end] == b".symtab" {
            return true;
        }
    }
    false
}

fn read_u32_field(bytes: &[u8], base: usize, _is_64bit: bool) -> Option<u32> {
    bytes.get(base..base + 4).map(|s| u32::from_le_bytes(s.try_into().unwrap()))
}

fn read_u64_field(bytes: &[u8], base: usize, is_64bit: bool) -> Option<u64> {
    if is_64bit {
        bytes.get(base..base + 8).map(|s| u64::from_le_bytes(s.try_into().unwrap()))
    } else {
        bytes.get(base..base + 4).map(|s| u32::from_le_bytes(s.try_into().unwrap()) as u64)
    }
}

/// `/etc/passwd` and `/etc/group` UID/GID snapshot taken once at startup
/// (§4.10 "Bad UID/GID"), rather than the live `getpwuid` lookups
/// `stat/core.rs` uses for display formatting — the lint check cares
/// whether the id resolves at all, not what name it resolves to.
struct OwnerSnapshot {
    uids: HashSet<u32>,
    gids: HashSet<u32>,
}

impl OwnerSnapshot {
    fn load() -> Self {
        OwnerSnapshot {
            uids: parse_id_column("/etc/passwd"),
            gids: parse_id_column("/etc/group"),
        }
    }

    fn knows_uid(&self, uid: u32) -> bool {
        self.uids.contains(&uid)
    }

    fn knows_gid(&self, gid: u32) -> bool {
        self.gids.contains(&gid)
    }
}

fn parse_id_column(path: &str) -> HashSet<u32> {
    let mut ids = HashSet::new();
    if let Ok(content) = fs::read_to_string(path) {
        for line in content.lines() {
            let fields: Vec<&str> = line.split(':').collect();
            if let Some(id) = fields.get(2).and_then(|s| s.parse().ok()) {
                ids.insert(id);
            }
        }
    }
    ids
}

pub fn mark_mtime_newer_than(records: &[FileRecord], min_mtime: SystemTime) -> bool {
    records.iter().any(|r| r.mtime > min_mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NullLogger;
    use crate::mount::DefaultMountTable;
    use crate::traverse::RawEntry;

    fn raw_entry(path: PathBuf, size: u64, dev: u64, ino: u64) -> RawEntry {
        RawEntry {
            path,
            dev,
            ino,
            size,
            mtime: SystemTime::UNIX_EPOCH,
            nlink: 1,
            is_symlink: false,
            is_hidden: false,
            is_dir: false,
            dir_child_count: None,
        }
    }

    fn preprocessor() -> Preprocessor<()> {
        Preprocessor::new(Arc::new(DefaultMountTable::discover()), Arc::new(PathTrie::new()), Arc::new(NullLogger))
    }

    #[test]
    fn hardlinked_files_bundle_into_one_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("a");
        let hardlink = dir.path().join("b");
        fs::write(&original, b"shared content").unwrap();
        fs::hard_link(&original, &hardlink).unwrap();
        let meta = fs::metadata(&original).unwrap();

        let entries =
            vec![raw_entry(original, meta.len(), meta.dev(), meta.ino()), raw_entry(hardlink, meta.len(), meta.dev(), meta.ino())];
        let output = preprocessor().run(entries.into_iter(), &PreprocessOpts::default());

        let clusters = output.size_buckets.get(&meta.len()).expect("bucket exists");
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].total_members(), 2);
    }

    #[test]
    fn cached_xattr_digest_is_read_onto_the_file_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"hello").unwrap();
        let meta = fs::metadata(&path).unwrap();

        if xattr::set(&path, "user.shredfind.digest", b"sha256:ab").is_err() {
            // Extended attributes unsupported on this filesystem — nothing
            // to assert, and the rest of the suite doesn't depend on it.
            return;
        }

        let opts = PreprocessOpts { read_ext_cksum_xattr: true, detect_lint: false };
        let entry = raw_entry(path, meta.len(), meta.dev(), meta.ino());
        let output = preprocessor().run(std::iter::once(entry), &opts);

        let cluster = output.size_buckets.get(&meta.len()).and_then(|v| v.first()).expect("one cluster");
        assert_eq!(cluster.representative.cached_digest, Some((crate::digest::DigestKind::Sha256, vec![0xab])));
    }

    #[test]
    fn xattr_read_disabled_by_default_leaves_cached_digest_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"hello").unwrap();
        let meta = fs::metadata(&path).unwrap();
        let _ = xattr::set(&path, "user.shredfind.digest", b"sha256:ab");

        let entry = raw_entry(path, meta.len(), meta.dev(), meta.ino());
        let output = preprocessor().run(std::iter::once(entry), &PreprocessOpts::default());

        let cluster = output.size_buckets.get(&meta.len()).and_then(|v| v.first()).expect("one cluster");
        assert_eq!(cluster.representative.cached_digest, None);
    }
}
