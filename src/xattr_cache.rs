//! Persistent extended-attribute digest cache (§6 "Persistent state at
//! the boundary"). Format: `<digest-type-name>:<hex-digest>`.

use std::path::Path;

use crate::digest::DigestKind;

const XATTR_NAME: &str = "user.shredfind.digest";

pub struct XattrCache {
    enabled: bool,
}

impl XattrCache {
    pub fn new(enabled: bool) -> Self {
        XattrCache { enabled }
    }

    /// Read a cached digest, populating the preprocessor's `ext_cksum`
    /// cluster key when present and parseable.
    pub fn read(&self, path: &Path) -> Option<(DigestKind, Vec<u8>)> {
        if !self.enabled {
            return None;
        }
        let raw = xattr::get(path, XATTR_NAME).ok().flatten()?;
        let text = std::str::from_utf8(&raw).ok()?;
        let (kind_name, hex) = text.split_once(':')?;
        let kind = DigestKind::parse(kind_name).ok()?;
        let bytes = decode_hex(hex)?;
        Some((kind, bytes))
    }

    /// Write the digest on finalization of a fully-hashed file, unless
    /// configured off.
    pub fn write(&self, path: &Path, kind: DigestKind, digest: &[u8]) {
        if !self.enabled {
            return;
        }
        let value = format!("{}:{}", kind.name(), encode_hex(digest));
        let _ = xattr::set(path, XATTR_NAME, value.as_bytes());
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let hi = (bytes[i] as char).to_digit(16)?;
        let lo = (bytes[i + 1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
        i += 2;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let bytes = vec![0x00, 0xff, 0x42, 0xab];
        assert_eq!(decode_hex(&encode_hex(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn disabled_cache_reads_nothing() {
        let cache = XattrCache::new(false);
        assert!(cache.read(Path::new("/tmp")).is_none());
    }
}
