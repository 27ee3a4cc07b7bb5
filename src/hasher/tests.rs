use std::io::Write;

use super::*;
use crate::digest::DigestKind;

fn write_tempfile(contents: &[u8]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents).unwrap();
    f.flush().unwrap();
    f
}

#[test]
fn buffered_hash_matches_whole_file_digest() {
    let file = write_tempfile(b"the quick brown fox");
    let hasher = Hasher::new(2, ReadMode::Buffered, 4, AbortFlag::new());
    let mut task = hasher.new_task(Digest::new(DigestKind::Sha256, 0));
    let n = task.hash(file.path(), 0, 20, false).unwrap();
    assert_eq!(n, 20);
    let digest = task.finish();

    let mut whole = Digest::new(DigestKind::Sha256, 0);
    whole.update(b"the quick brown fox");
    assert_eq!(digest.steal(), whole.steal());
}

#[test]
fn buffered_hash_above_mmap_threshold_matches_whole_file_digest() {
    let payload = vec![0x5au8; 200 * 1024];
    let file = write_tempfile(&payload);
    let hasher = Hasher::new(2, ReadMode::Buffered, 8192, AbortFlag::new());
    let mut task = hasher.new_task(Digest::new(DigestKind::Sha256, 0));
    let n = task.hash(file.path(), 0, payload.len() as u64, false).unwrap();
    assert_eq!(n, payload.len() as u64);
    let digest = task.finish();

    let mut whole = Digest::new(DigestKind::Sha256, 0);
    whole.update(&payload);
    assert_eq!(digest.steal(), whole.steal());
}

#[test]
fn preadv_hash_matches_whole_file_digest() {
    let file = write_tempfile(b"0123456789abcdef0123456789abcdef");
    let hasher = Hasher::new(2, ReadMode::Preadv, 4, AbortFlag::new());
    let mut task = hasher.new_task(Digest::new(DigestKind::Blake2b { output_bytes: 64 }, 0));
    let n = task.hash(file.path(), 0, 33, false).unwrap();
    assert_eq!(n, 33);
    let digest = task.finish();

    let mut whole = Digest::new(DigestKind::Blake2b { output_bytes: 64 }, 0);
    whole.update(b"0123456789abcdef0123456789abcdef");
    assert_eq!(digest.steal(), whole.steal());
}

#[test]
fn symlink_mode_hashes_target_text_not_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target.txt");
    std::fs::write(&target, b"ignored contents").unwrap();
    let link = dir.path().join("link");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let hasher = Hasher::new(1, ReadMode::Buffered, 64, AbortFlag::new());
    let mut task = hasher.new_task(Digest::new(DigestKind::Sha256, 0));
    task.hash(&link, 0, 0, true).unwrap();
    let digest = task.finish();

    let mut expected = Digest::new(DigestKind::Sha256, 0);
    expected.update(target.as_os_str().as_encoded_bytes());
    assert_eq!(digest.steal(), expected.steal());
}
