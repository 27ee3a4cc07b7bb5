//! Finalization and ranking (component F, §4.6).

use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::record::{Cluster, DupGroupEvent, EmittedFile, FileRecord};
use crate::trie::PathTrie;
use crate::xattr_cache::XattrCache;

#[derive(Debug, Clone, Copy)]
struct Criterion {
    key: char,
    descending: bool,
}

/// Parses `rank_criteria` (e.g. `"pOma"`): a string of single-character
/// keys, uppercase inverting the comparison direction. The six keys are
/// `p/P` (first/last path), `m/M` (oldest/newest mtime), `a/A`
/// (lex-first/last basename), `s/S` (smallest/largest size), `n/N`
/// (fewest/most bundled hardlinks), `o/O` (insertion order). Unknown
/// characters are skipped rather than rejected — an unrecognized
/// criterion simply contributes nothing to the tie-break chain.
fn parse_criteria(spec: &str) -> Vec<Criterion> {
    spec.chars()
        .filter(|c| "pmaosnPMAOSN".contains(*c))
        .map(|c| Criterion {
            key: c.to_ascii_lowercase(),
            descending: c.is_ascii_uppercase(),
        })
        .collect()
}

struct RankedFile<'a> {
    record: &'a FileRecord,
    path: PathBuf,
    insertion_order: usize,
    /// How many filesystem paths this record's bundle represents (§4.6
    /// step 1 `unbundle`) — the `n` ranking key.
    group_count: u64,
}

fn compare_one(a: &RankedFile, b: &RankedFile, criterion: &Criterion) -> Ordering {
    let ord = match criterion.key {
        // first/last-seen path: lexicographic on the full path.
        'p' => a.path.cmp(&b.path),
        // oldest/newest mtime.
        'm' => a.record.mtime.cmp(&b.record.mtime),
        // lex-first/last basename.
        'a' => a.path.file_name().cmp(&b.path.file_name()),
        // smallest/largest size.
        's' => a.record.size.cmp(&b.record.size),
        // fewest/most bundled hardlinks.
        'n' => a.group_count.cmp(&b.group_count),
        // insertion (traversal) order.
        'o' => a.insertion_order.cmp(&b.insertion_order),
        _ => Ordering::Equal,
    };
    if criterion.descending {
        ord.reverse()
    } else {
        ord
    }
}

/// Sorts `files` by the configured criteria string, ties falling
/// through in order, and returns the sorted list with the chosen
/// original(s) marked.
fn rank<'a>(
    files: Vec<&'a FileRecord>,
    paths: &[PathBuf],
    group_counts: &[u64],
    criteria: &[Criterion],
) -> Vec<RankedFile<'a>> {
    let mut ranked: Vec<RankedFile> = files
        .into_iter()
        .zip(paths.iter().cloned())
        .zip(group_counts.iter().copied())
        .enumerate()
        .map(|(i, ((record, path), group_count))| RankedFile { record, path, insertion_order: i, group_count })
        .collect();
    ranked.sort_by(|a, b| {
        for c in criteria {
            let ord = compare_one(a, b, c);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    ranked
}

/// §4.6 step 1: unbundle hardlink clusters into a flat queue, recording
/// `outer_link_count` so downstream size accounting knows how many
/// filesystem links point outside the bundle. Returns the bundle size
/// alongside — every unbundled record shares it as its `n` rank key.
fn unbundle(cluster: Cluster) -> (Vec<FileRecord>, u64) {
    let bundled = 1 + cluster.members.len();
    let mut representative = cluster.representative;
    representative.outer_link_count = representative.outer_link_count.saturating_sub(bundled as u64 - 1);
    let mut out = vec![representative];
    out.extend(cluster.members);
    (out, bundled as u64)
}

pub struct Finalizer<V> {
    trie: std::sync::Arc<PathTrie<V>>,
}

impl<V: Clone> Finalizer<V> {
    pub fn new(trie: std::sync::Arc<PathTrie<V>>) -> Self {
        Finalizer { trie }
    }

    /// §4.6: rank, mark originals, post-split on mtime window / unique
    /// basename, and produce the (possibly several) emitted subgroups.
    pub fn finalize(&self, clusters: Vec<Cluster>, config: &Config) -> Vec<DupGroupEvent> {
        let criteria = parse_criteria(&config.rank_criteria);
        let xattr_cache = XattrCache::new(config.use_xattr_cache);
        let mut flat: Vec<FileRecord> = Vec::new();
        let mut group_counts: Vec<u64> = Vec::new();
        for cluster in clusters {
            let resolved_digest = cluster.resolved_digest.clone();
            let (members, bundled) = unbundle(cluster);
            // §6: a digest the shred engine fully resolved this pass is
            // persisted back to every member's xattr so a later run can
            // skip hashing this file entirely (scenario 4).
            if let Some((kind, bytes)) = &resolved_digest {
                for member in &members {
                    xattr_cache.write(&member.path, *kind, bytes);
                }
            }
            group_counts.extend(std::iter::repeat(bundled).take(members.len()));
            flat.extend(members);
        }

        let paths: Vec<PathBuf> = flat.iter().map(|r| self.trie.rebuild_path(r.path_node)).collect();
        let refs: Vec<&FileRecord> = flat.iter().collect();
        let ranked = rank(refs, &paths, &group_counts, &criteria);

        let subgroups = split_subgroups(ranked, config);

        subgroups
            .into_iter()
            .filter_map(|group| self.emit_subgroup(group, config))
            .collect()
    }

    fn emit_subgroup(&self, group: Vec<RankedFile>, config: &Config) -> Option<DupGroupEvent> {
        if group.len() < 2 {
            return None;
        }
        let mut files = Vec::with_capacity(group.len());
        let mut byte_savings = 0u64;
        for (i, ranked) in group.iter().enumerate() {
            let is_original = if config.keep_all_tagged || config.keep_all_untagged {
                ranked.record.tagged == config.keep_all_tagged
            } else {
                i == 0
            };
            if !is_original {
                byte_savings += ranked.record.size;
            }
            files.push(EmittedFile {
                path: ranked.path.clone(),
                size: ranked.record.size,
                is_original,
            });
        }
        let duplicate_count = files.iter().filter(|f| !f.is_original).count();
        // A single degenerate subgroup (all originals, no duplicates) is
        // suppressed from the duplicates channel.
        if duplicate_count == 0 {
            return None;
        }
        Some(DupGroupEvent {
            files,
            duplicate_count,
            byte_savings,
            directory_merge_candidate: config.merge_directories,
        })
    }
}

/// §4.6 step 4: split on mtime window and unique-basename, re-ranking
/// each resulting subgroup is a no-op here since the input is already
/// sorted and splitting preserves relative order.
fn split_subgroups<'a>(ranked: Vec<RankedFile<'a>>, config: &Config) -> Vec<Vec<RankedFile<'a>>> {
    let mut groups = vec![ranked];

    if let Some(window) = config.mtime_window {
        groups = groups.into_iter().flat_map(|g| split_by_mtime_window(g, window)).collect();
    }

    if config.unmatched_basenames {
        groups = groups.into_iter().flat_map(split_by_unique_basename).collect();
    }

    groups
}

fn split_by_mtime_window(group: Vec<RankedFile>, window: Duration) -> Vec<Vec<RankedFile>> {
    if group.is_empty() {
        return Vec::new();
    }
    let mut out: Vec<Vec<RankedFile>> = Vec::new();
    let mut current: Vec<RankedFile> = Vec::new();
    for file in group {
        if let Some(first) = current.first() {
            let lo = first.record.mtime.min(file.record.mtime);
            let hi = first.record.mtime.max(file.record.mtime);
            let span = hi.duration_since(lo).unwrap_or_default();
            if span > window {
                out.push(std::mem::take(&mut current));
            }
        }
        current.push(file);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// When the head (the chosen original) doesn't have a unique basename
/// among the group, peel same-basename duplicates into a new subgroup.
fn split_by_unique_basename(group: Vec<RankedFile>) -> Vec<Vec<RankedFile>> {
    let Some(head) = group.first() else {
        return vec![group];
    };
    let head_name = head.path.file_name().map(|n| n.to_os_string());
    let all_unique = group.iter().all(|f| f.path.file_name().map(|n| n.to_os_string()) != head_name)
        || group.len() <= 1;
    if all_unique {
        return vec![group];
    }
    let (same, rest): (Vec<_>, Vec<_>) = group
        .into_iter()
        .partition(|f| f.path.file_name().map(|n| n.to_os_string()) == head_name);
    vec![same, rest].into_iter().filter(|g| !g.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rank_criteria_directions() {
        let criteria = parse_criteria("pOma");
        assert_eq!(criteria.len(), 4);
        assert_eq!(criteria[0].key, 'p');
        assert!(!criteria[0].descending);
        assert_eq!(criteria[1].key, 'o');
        assert!(criteria[1].descending);
    }

    #[test]
    fn unknown_criteria_characters_are_skipped() {
        let criteria = parse_criteria("pzq");
        assert_eq!(criteria.len(), 1);
    }

    #[test]
    fn parses_size_and_group_count_criteria() {
        let criteria = parse_criteria("sN");
        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria[0].key, 's');
        assert!(!criteria[0].descending);
        assert_eq!(criteria[1].key, 'n');
        assert!(criteria[1].descending);
    }

    fn record_at(trie: &PathTrie<()>, path: &str, size: u64) -> FileRecord {
        let path = PathBuf::from(path);
        let node = trie.insert(&path);
        FileRecord::new(node, path, 1, crate::mount::DiskId(1), 1, size, std::time::SystemTime::UNIX_EPOCH)
    }

    #[test]
    fn size_criterion_sorts_smallest_first_unless_inverted() {
        let trie: PathTrie<()> = PathTrie::new();
        let small = record_at(&trie, "/a/small", 10);
        let big = record_at(&trie, "/a/big", 100);
        let paths = vec![big.path.clone(), small.path.clone()];
        let criteria = parse_criteria("s");
        let ranked = rank(vec![&big, &small], &paths, &[0, 0], &criteria);
        assert_eq!(ranked[0].record.size, 10);
        assert_eq!(ranked[1].record.size, 100);
    }

    #[test]
    fn group_count_criterion_breaks_ties_by_bundle_size() {
        let trie: PathTrie<()> = PathTrie::new();
        let a = record_at(&trie, "/a/one", 10);
        let b = record_at(&trie, "/a/two", 10);
        let paths = vec![a.path.clone(), b.path.clone()];
        let criteria = parse_criteria("N");
        let ranked = rank(vec![&a, &b], &paths, &[1, 3], &criteria);
        assert_eq!(ranked[0].group_count, 3);
        assert_eq!(ranked[1].group_count, 1);
    }
}
