use super::*;

#[test]
fn unknown_digest_name_fails_fast() {
    assert!(DigestKind::parse("not-a-hash").is_err());
}

#[test]
fn parse_round_trips_through_name() {
    for kind in [
        DigestKind::Blake2b { output_bytes: 64 },
        DigestKind::Sha256,
        DigestKind::Sha512,
        DigestKind::Md5,
        DigestKind::Xxh3,
        DigestKind::Cumulative,
        DigestKind::External,
        DigestKind::Paranoid,
    ] {
        assert_eq!(DigestKind::parse(kind.name()).unwrap(), kind);
    }
}

#[test]
fn same_bytes_same_digest_for_strong_hashes() {
    for kind in [DigestKind::Blake2b { output_bytes: 64 }, DigestKind::Sha256, DigestKind::Sha512, DigestKind::Md5] {
        let mut a = Digest::new(kind, 0);
        let mut b = Digest::new(kind, 0);
        a.update(b"duplicate finder");
        b.update(b"duplicate finder");
        assert!(Digest::equal(&a, &b));
    }
}

#[test]
fn clone_state_preserves_steal_value() {
    let mut a = Digest::new(DigestKind::Sha256, 0);
    a.update(b"first chunk");
    let b = a.clone_state();
    assert_eq!(a.steal(), b.steal());
}

#[test]
fn clone_state_then_divergent_update_differs() {
    let mut a = Digest::new(DigestKind::Sha256, 0);
    a.update(b"shared");
    let mut b = a.clone_state();
    a.update(b"-a-tail");
    b.update(b"-b-tail");
    assert!(!Digest::equal(&a, &b));
}

#[test]
fn digest_key_usable_as_hashmap_key() {
    use std::collections::HashMap;

    let mut a = Digest::new(DigestKind::Xxh3, 0);
    a.update(b"x");
    let mut b = Digest::new(DigestKind::Xxh3, 0);
    b.update(b"x");

    let mut map: HashMap<DigestKey, u32> = HashMap::new();
    map.insert(DigestKey(a), 1);
    assert_eq!(map.get(&DigestKey(b)), Some(&1));
}

#[test]
fn paranoid_digest_equal_uses_byte_compare() {
    let mut a = Digest::new(DigestKind::Paranoid, 0);
    let mut b = Digest::new(DigestKind::Paranoid, 0);
    a.update(b"paranoid bytes");
    b.update(b"paranoid bytes");
    assert!(Digest::equal(&a, &b));
    assert!(a.is_paranoid());
}

#[test]
fn external_digest_adopts_caller_checksum() {
    let mut a = Digest::new(DigestKind::External, 0);
    a.update(b"deadbeef");
    assert_eq!(a.steal(), vec![0xde, 0xad, 0xbe, 0xef]);
}
