use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tempfile::tempdir;

use super::*;
use crate::logger::NullLogger;
use crate::mount::DiskId;
use crate::record::FileRecord;
use crate::trie::PathTrie;

struct FixedMountTable;

impl MountTable for FixedMountTable {
    fn disk_id(&self, dev: u64) -> DiskId {
        DiskId(dev)
    }
    fn is_nonrotational(&self, _disk: DiskId) -> bool {
        true
    }
    fn can_reflink(&self, src: DiskId, dst: DiskId) -> bool {
        src == dst
    }
}

fn engine() -> ShredEngine {
    let mut config = Config::default();
    config.threads = 4;
    config.threads_per_disk = 1;
    ShredEngine::new(Arc::new(FixedMountTable), &config, AbortFlag::new(), Arc::new(NullLogger))
}

fn cluster_for(dir: &std::path::Path, trie: &PathTrie<()>, name: &str, contents: &[u8]) -> Cluster {
    let path: PathBuf = dir.join(name);
    fs::write(&path, contents).unwrap();
    let node = trie.insert(&path);
    let meta = fs::metadata(&path).unwrap();
    let record = FileRecord::new(
        node,
        path,
        meta.dev(),
        DiskId(meta.dev()),
        meta.ino(),
        meta.len(),
        meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    );
    Cluster::single(record)
}

fn cluster_with_cached_digest(
    dir: &std::path::Path,
    trie: &PathTrie<()>,
    name: &str,
    contents: &[u8],
    cached: (DigestKind, Vec<u8>),
) -> Cluster {
    let mut cluster = cluster_for(dir, trie, name, contents);
    cluster.representative.cached_digest = Some(cached);
    cluster
}

#[test]
fn two_identical_files_form_one_group() {
    let dir = tempdir().unwrap();
    let trie: PathTrie<()> = PathTrie::new();
    let payload = vec![7u8; 5000];
    let a = cluster_for(dir.path(), &trie, "a", &payload);
    let b = cluster_for(dir.path(), &trie, "b", &payload);

    let engine = engine();
    let config = Config::default();
    let results = engine
        .run_size_bucket(payload.len() as u64, vec![a, b], DigestKind::Xxh3, &config)
        .unwrap();
    engine.shutdown();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].len(), 2);
}

#[test]
fn divergent_file_peels_off_into_its_own_group() {
    let dir = tempdir().unwrap();
    let trie: PathTrie<()> = PathTrie::new();
    let shared = vec![3u8; 9000];
    let mut different = shared.clone();
    different[8000] = 255;

    let a = cluster_for(dir.path(), &trie, "a", &shared);
    let b = cluster_for(dir.path(), &trie, "b", &shared);
    let c = cluster_for(dir.path(), &trie, "c", &different);

    let engine = engine();
    let config = Config::default();
    let results = engine
        .run_size_bucket(shared.len() as u64, vec![a, b, c], DigestKind::Xxh3, &config)
        .unwrap();
    engine.shutdown();

    assert_eq!(results.len(), 2);
    let sizes: Vec<usize> = {
        let mut v: Vec<usize> = results.iter().map(|g| g.len()).collect();
        v.sort_unstable();
        v
    };
    assert_eq!(sizes, vec![1, 2]);
}

#[test]
fn single_entrant_never_forms_a_group() {
    let dir = tempdir().unwrap();
    let trie: PathTrie<()> = PathTrie::new();
    let a = cluster_for(dir.path(), &trie, "a", b"lonely");

    let engine = engine();
    let config = Config::default();
    let results = engine.run_size_bucket(6, vec![a], DigestKind::Xxh3, &config).unwrap();
    engine.shutdown();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].len(), 1);
}

#[test]
fn zero_size_entrants_form_one_trivial_group_without_hashing() {
    let dir = tempdir().unwrap();
    let trie: PathTrie<()> = PathTrie::new();
    let a = cluster_for(dir.path(), &trie, "a", b"");
    let b = cluster_for(dir.path(), &trie, "b", b"");

    let engine = engine();
    let config = Config::default();
    let results = engine.run_size_bucket(0, vec![a, b], DigestKind::Xxh3, &config).unwrap();
    engine.shutdown();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].len(), 2);
}

#[test]
fn cached_digest_merges_clusters_without_reading_file_bytes() {
    let dir = tempdir().unwrap();
    let trie: PathTrie<()> = PathTrie::new();
    // Deliberately different on-disk contents: if the engine fell back to
    // reading bytes it would split these into two groups. A shared cached
    // digest must merge them without ever touching the file data.
    let cached = (DigestKind::Sha256, vec![0xab; 32]);
    let a = cluster_with_cached_digest(dir.path(), &trie, "a", b"one flavor of content", cached.clone());
    let b = cluster_with_cached_digest(dir.path(), &trie, "b", b"a wholly different body", cached);

    let engine = engine();
    let config = Config::default();
    let results = engine.run_size_bucket(999, vec![a, b], DigestKind::Sha256, &config).unwrap();
    engine.shutdown();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].len(), 2);
}

#[test]
fn paranoid_outlier_splits_off_at_second_generation() {
    let dir = tempdir().unwrap();
    let trie: PathTrie<()> = PathTrie::new();

    // Sized so generation 1 (offset_factor 1) stops at 16384 bytes short
    // of EOF, and generation 2's window (131072) clamps to EOF — see
    // `sift::group::next_offset`. The outlier shares the first 20000
    // bytes with the rest, so it only peels off once generation 2 reads
    // past that point.
    let file_size = 50_000usize;
    let shared = vec![9u8; file_size];
    let mut outlier = shared.clone();
    outlier[20_000] = 0;

    let mut clusters = Vec::new();
    for i in 0..9 {
        clusters.push(cluster_for(dir.path(), &trie, &format!("same-{i}"), &shared));
    }
    clusters.push(cluster_for(dir.path(), &trie, "outlier", &outlier));

    let engine = engine();
    let mut config = Config::default();
    config.paranoid_collision_policy = crate::config::ParanoidCollisionPolicy::LogAndBifurcate;
    let results = engine
        .run_size_bucket(file_size as u64, clusters, DigestKind::Paranoid, &config)
        .unwrap();
    engine.shutdown();

    let mut sizes: Vec<usize> = results.iter().map(|g| g.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 9]);
}
