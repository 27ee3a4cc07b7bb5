//! Shred group state (§3 "Group", §4.4 state machine).
//!
//! The engine in [`super`] processes one whole group per generation as a
//! unit (every member advances from `hash_offset` to the same
//! `next_offset` together), rather than maintaining a live parent/child
//! object graph with asynchronous per-file arrival. That collapses the
//! need for the arena-indices / owning-parent-weak-child structure the
//! Design Notes call for — there is never a moment where a parent and an
//! in-progress child are simultaneously mutable from different threads —
//! while preserving every invariant in §8 (same-size groups, children
//! keyed by digest through `next_offset`, monotonic offsets). Noted as a
//! deliberate simplification in `DESIGN.md`.

use crate::digest::{Digest, DigestKind};
use crate::record::Cluster;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Dormant,
    StartHashing,
    Hashing,
    Finishing,
    Finished,
}

/// One logical entrant to the shred engine together with its
/// in-progress digest. A cluster bundles hardlinks/external-checksum
/// siblings (§3 Cluster) so they cost one digest computation.
pub struct GroupMember {
    pub cluster: Cluster,
    pub digest: Digest,
    pub ignored: bool,
    /// The digest kind to record on `cluster.resolved_digest` once this
    /// member's equivalence class is settled — the bucket's configured
    /// kind for freshly hashed members, or the kind read back from the
    /// xattr cache for members that never get hashed at all.
    pub cached_kind: DigestKind,
}

pub struct Group {
    pub file_size: u64,
    pub hash_offset: u64,
    pub offset_factor: u64,
    pub status: GroupStatus,
    pub members: Vec<GroupMember>,
}

impl Group {
    pub fn root(file_size: u64, members: Vec<GroupMember>) -> Self {
        Group {
            file_size,
            hash_offset: 0,
            offset_factor: 1,
            status: GroupStatus::Dormant,
            members,
        }
    }
}

/// §4.4 "Next-increment sizing": `balanced_bytes × offset_factor`,
/// `offset_factor` growing 8× per generation and the window capped at
/// 256 MiB. If the remainder fits in one more balanced window, extend to
/// EOF instead. Paranoid mode caps a single increment at 16 MiB.
pub fn next_offset(hash_offset: u64, file_size: u64, offset_factor: u64, paranoid: bool) -> u64 {
    const PAGE: u64 = 4096;
    const BALANCED_BYTES: u64 = PAGE * 4;
    const CEILING: u64 = 256 * 1024 * 1024;
    const PARANOID_CAP: u64 = 16 * 1024 * 1024;

    let mut window = BALANCED_BYTES.saturating_mul(offset_factor).min(CEILING);
    if paranoid {
        window = window.min(PARANOID_CAP);
    }
    let mut candidate = hash_offset.saturating_add(window);
    if file_size.saturating_sub(candidate) <= window {
        candidate = file_size;
    }
    candidate.min(file_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_file_jumps_straight_to_eof() {
        assert_eq!(next_offset(0, 1000, 1, false), 1000);
    }

    #[test]
    fn large_file_extends_window_geometrically() {
        let first = next_offset(0, 10 * 1024 * 1024 * 1024, 1, false);
        assert_eq!(first, 16 * 1024);
        let second = next_offset(first, 10 * 1024 * 1024 * 1024, 8, false);
        assert!(second > first);
    }

    #[test]
    fn paranoid_caps_single_increment() {
        let offset = next_offset(0, 10 * 1024 * 1024 * 1024, 1_000_000, true);
        assert_eq!(offset, 16 * 1024 * 1024);
    }

    #[test]
    fn never_exceeds_file_size() {
        assert!(next_offset(900, 1000, 1_000_000, false) <= 1000);
    }
}
