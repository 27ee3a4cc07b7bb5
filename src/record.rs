//! Data model (§3): file records and the cluster/progress payload types
//! exposed to the formatter layer (§3.1).

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::digest::DigestKind;
use crate::trie::NodeId;

/// One candidate entrant to the shred engine (§3 "File record").
pub struct FileRecord {
    pub path_node: NodeId,
    /// Resolved absolute path. The trie node remains the canonical
    /// identity (cheap basename/pointer comparisons, §4.7); this field
    /// exists because the hasher needs an actual path to open.
    pub path: PathBuf,
    pub dev: u64,
    pub disk_id: crate::mount::DiskId,
    pub ino: u64,
    pub size: u64,
    pub mtime: SystemTime,
    pub preferred: bool,
    pub hidden: bool,
    pub tagged: bool,
    pub is_symlink: bool,
    pub outer_link_count: u64,
    /// Digest read back from the `user.shredfind.digest` xattr during
    /// preprocessing (§4.2/§6), if present and the cache is enabled.
    pub cached_digest: Option<(DigestKind, Vec<u8>)>,
}

impl FileRecord {
    pub fn new(
        path_node: NodeId,
        path: PathBuf,
        dev: u64,
        disk_id: crate::mount::DiskId,
        ino: u64,
        size: u64,
        mtime: SystemTime,
    ) -> Self {
        FileRecord {
            path_node,
            path,
            dev,
            disk_id,
            ino,
            size,
            mtime,
            preferred: false,
            hidden: false,
            tagged: false,
            is_symlink: false,
            outer_link_count: 1,
            cached_digest: None,
        }
    }
}

/// A pre-bundled set of files treated as one logical entrant to the
/// shred engine (GLOSSARY "Cluster") — hardlinks to one inode, or files
/// sharing a cached external checksum.
pub struct Cluster {
    pub representative: FileRecord,
    pub members: Vec<FileRecord>,
    /// The digest this cluster settled on once the shred engine finished
    /// with it (either the cached value or a freshly computed one),
    /// written back to the xattr cache on finalization (§6).
    pub resolved_digest: Option<(DigestKind, Vec<u8>)>,
}

impl Cluster {
    pub fn single(record: FileRecord) -> Self {
        Cluster {
            representative: record,
            members: Vec::new(),
            resolved_digest: None,
        }
    }

    pub fn total_members(&self) -> usize {
        1 + self.members.len()
    }

    pub fn representative_path(&self) -> &Path {
        &self.representative.path
    }
}

/// One finalized record inside an emitted duplicate group, as seen by
/// the formatter (§6 "On-complete of a duplicate group").
#[derive(Debug, Clone, Serialize)]
pub struct EmittedFile {
    pub path: PathBuf,
    pub size: u64,
    pub is_original: bool,
}

/// §6 exposed interface: an ordered sequence of file records, the first
/// flagged as original.
#[derive(Debug, Clone, Serialize)]
pub struct DupGroupEvent {
    pub files: Vec<EmittedFile>,
    pub duplicate_count: usize,
    pub byte_savings: u64,
    pub directory_merge_candidate: bool,
}

/// §4.10 lint findings, forwarded straight to the formatter.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum LintFinding {
    EmptyFile(PathBuf),
    EmptyDirectory(PathBuf),
    BadOwner { path: PathBuf, uid: u32, gid: u32 },
    DanglingSymlink(PathBuf),
    NonStrippedBinary(PathBuf),
}

/// §6 exposed interface: coarse progress state with counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Traverse,
    Preprocess,
    Shredder,
    Merge,
    Summary,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub bytes_remaining: u64,
    pub files_remaining: u64,
    pub duplicates_found: u64,
    pub groups_found: u64,
    pub aborted: bool,
}

impl Default for ProgressEvent {
    fn default() -> Self {
        ProgressEvent {
            phase: ProgressPhase::Traverse,
            bytes_remaining: 0,
            files_remaining: 0,
            duplicates_found: 0,
            groups_found: 0,
            aborted: false,
        }
    }
}
