//! Core configuration (§6 "Config supplies..."). Plain struct with a
//! `Default` impl, in the style of `DuConfig`/`DfConfig`.

use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    Heuristic,
    AlwaysWait,
    NeverWait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParanoidCollisionPolicy {
    /// §9 Open Question, resolved: shadow-hash collisions are
    /// vanishingly rare for modern strong hashes, so default to a fatal
    /// abort rather than silently bifurcating the group.
    Fatal,
    LogAndBifurcate,
}

pub struct Config {
    pub checksum_type: String,
    pub threads: usize,
    pub threads_per_disk: usize,
    /// Pass quota (§4.3 `Mds::configure`'s `pass_quota`).
    pub sweep_count: usize,
    pub sweep_size: u64,
    pub total_mem: u64,
    pub read_buf_len: usize,
    pub use_buffered_read: bool,
    pub follow_symlinks: bool,
    pub must_match_tagged: bool,
    pub must_match_untagged: bool,
    pub keep_all_tagged: bool,
    pub keep_all_untagged: bool,
    pub min_mtime: Option<SystemTime>,
    pub mtime_window: Option<Duration>,
    pub unmatched_basenames: bool,
    pub merge_directories: bool,
    pub write_unfinished: bool,
    /// `rank_criteria` string, e.g. `"pOma"` (§4.6).
    pub rank_criteria: String,
    pub wait_policy: WaitPolicy,
    pub paranoid_collision_policy: ParanoidCollisionPolicy,
    pub use_xattr_cache: bool,
    pub one_file_system: bool,
    pub detect_lint: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            checksum_type: "blake2b".to_string(),
            threads: 8,
            threads_per_disk: 2,
            sweep_count: 16,
            sweep_size: 16 * 1024 * 1024,
            total_mem: 256 * 1024 * 1024,
            read_buf_len: 64 * 1024,
            use_buffered_read: true,
            follow_symlinks: false,
            must_match_tagged: false,
            must_match_untagged: false,
            keep_all_tagged: false,
            keep_all_untagged: false,
            min_mtime: None,
            mtime_window: None,
            unmatched_basenames: false,
            merge_directories: false,
            write_unfinished: false,
            rank_criteria: "pOma".to_string(),
            wait_policy: WaitPolicy::Heuristic,
            paranoid_collision_policy: ParanoidCollisionPolicy::Fatal,
            use_xattr_cache: false,
            one_file_system: false,
            detect_lint: true,
        }
    }
}

/// §9 Open Question, resolved: the heuristic (`SHRED_TOO_MANY_BYTES_TO_WAIT`,
/// 64 MiB) is the default; the toggles are absolute overrides.
pub const SHRED_TOO_MANY_BYTES_TO_WAIT: u64 = 64 * 1024 * 1024;

impl Config {
    pub fn should_wait_on_same_disk_arm(&self, increment_len: u64, is_rotational: bool) -> bool {
        match self.wait_policy {
            WaitPolicy::AlwaysWait => true,
            WaitPolicy::NeverWait => false,
            WaitPolicy::Heuristic => is_rotational && increment_len < SHRED_TOO_MANY_BYTES_TO_WAIT,
        }
    }
}
