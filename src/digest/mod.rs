//! Digest capability (component A, §4.1).
//!
//! A tagged union of digest states behind one set of operations —
//! `new`/`update`/`clone_state`/`steal`/`equal`/`hash_key` — rather than
//! the original's vtable-of-function-pointers. The paranoid variant lives
//! in [`crate::paranoid`] and is folded in here behind the same interface,
//! as the Design Notes call for, even though its `update` is buffer-driven
//! rather than slice-driven.

mod cumulative;
mod external;

#[cfg(test)]
mod tests;

use digest::Digest as _DigestTraitImpl;
use md5::Md5;
use sha2::{Sha256, Sha512};

use crate::error::CoreError;
use crate::paranoid::ParanoidHandle;

pub use cumulative::CumulativeState;
pub use external::ExternalState;

/// Which concrete variant a [`Digest`] is. Chosen externally (config
/// parsing); unknown names fail fast before any work begins (§7
/// `DigestError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestKind {
    Blake2b { output_bytes: usize },
    Sha256,
    Sha512,
    Md5,
    Xxh3,
    /// `update(a); update(b) == update(b); update(a)` — order-independent.
    Cumulative,
    /// State is the bytes of a caller-supplied checksum (e.g. from an
    /// extended attribute); the first `update` call is parsed as hex.
    External,
    Paranoid,
}

impl DigestKind {
    pub fn parse(name: &str) -> Result<DigestKind, CoreError> {
        match name.to_ascii_lowercase().as_str() {
            "blake2b" => Ok(DigestKind::Blake2b { output_bytes: 64 }),
            "blake2b-256" => Ok(DigestKind::Blake2b { output_bytes: 32 }),
            "sha256" => Ok(DigestKind::Sha256),
            "sha512" => Ok(DigestKind::Sha512),
            "md5" => Ok(DigestKind::Md5),
            "xxh3" | "xxhash" => Ok(DigestKind::Xxh3),
            "cumulative" => Ok(DigestKind::Cumulative),
            "ext" | "external" => Ok(DigestKind::External),
            "paranoid" => Ok(DigestKind::Paranoid),
            other => Err(CoreError::UnknownDigest(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DigestKind::Blake2b { output_bytes: 64 } => "blake2b",
            DigestKind::Blake2b { .. } => "blake2b-256",
            DigestKind::Sha256 => "sha256",
            DigestKind::Sha512 => "sha512",
            DigestKind::Md5 => "md5",
            DigestKind::Xxh3 => "xxh3",
            DigestKind::Cumulative => "cumulative",
            DigestKind::External => "ext",
            DigestKind::Paranoid => "paranoid",
        }
    }
}

/// One digest-in-progress. `update` is order-dependent for every variant
/// except `Cumulative`.
pub enum Digest {
    Blake2b(blake2b_simd::State, usize),
    Sha256(Sha256),
    Sha512(Sha512),
    Md5(Md5),
    Xxh3(xxhash_rust::xxh3::Xxh3),
    Cumulative(CumulativeState),
    External(ExternalState),
    Paranoid(ParanoidHandle),
}

impl Digest {
    /// `seed` is only meaningful to variants that can make use of one
    /// (cumulative accumulator start value); other variants ignore it.
    pub fn new(kind: DigestKind, seed: u64) -> Digest {
        match kind {
            DigestKind::Blake2b { output_bytes } => Digest::Blake2b(
                blake2b_simd::Params::new()
                    .hash_length(output_bytes)
                    .to_state(),
                output_bytes,
            ),
            DigestKind::Sha256 => Digest::Sha256(Sha256::new()),
            DigestKind::Sha512 => Digest::Sha512(Sha512::new()),
            DigestKind::Md5 => Digest::Md5(Md5::new()),
            DigestKind::Xxh3 => Digest::Xxh3(xxhash_rust::xxh3::Xxh3::with_seed(seed)),
            DigestKind::Cumulative => Digest::Cumulative(CumulativeState::new(seed)),
            DigestKind::External => Digest::External(ExternalState::new()),
            DigestKind::Paranoid => Digest::Paranoid(ParanoidHandle::new()),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            Digest::Blake2b(state, _) => {
                state.update(bytes);
            }
            Digest::Sha256(h) => h.update(bytes),
            Digest::Sha512(h) => h.update(bytes),
            Digest::Md5(h) => h.update(bytes),
            Digest::Xxh3(h) => h.update(bytes),
            Digest::Cumulative(c) => c.update(bytes),
            Digest::External(e) => e.update(bytes),
            Digest::Paranoid(p) => p.update_bytes(bytes),
        }
    }

    /// `clone(state) -> state'`. For ordinary hashes this is a deep copy
    /// of the running accumulator, used to seed a child group's newcomers
    /// with the bytes already hashed through `hash_offset` (§3 Group:
    /// "template digest cloned into newcomers") without re-reading from
    /// the start of the file. For paranoid, see [`ParanoidHandle::clone_as_twin`].
    pub fn clone_state(&self) -> Digest {
        match self {
            Digest::Blake2b(state, bits) => Digest::Blake2b(state.clone(), *bits),
            Digest::Sha256(h) => Digest::Sha256(h.clone()),
            Digest::Sha512(h) => Digest::Sha512(h.clone()),
            Digest::Md5(h) => Digest::Md5(h.clone()),
            Digest::Xxh3(h) => Digest::Xxh3(h.clone()),
            Digest::Cumulative(c) => Digest::Cumulative(c.clone()),
            Digest::External(e) => Digest::External(e.clone()),
            Digest::Paranoid(p) => Digest::Paranoid(p.clone_as_twin()),
        }
    }

    /// `steal(state) -> result_bytes`. Non-destructive: callers keep
    /// using the digest for further increments.
    pub fn steal(&self) -> Vec<u8> {
        match self {
            Digest::Blake2b(state, _) => state.clone().finalize().as_bytes().to_vec(),
            Digest::Sha256(h) => h.clone().finalize().to_vec(),
            Digest::Sha512(h) => h.clone().finalize().to_vec(),
            Digest::Md5(h) => h.clone().finalize().to_vec(),
            Digest::Xxh3(h) => h.clone().digest128().to_be_bytes().to_vec(),
            Digest::Cumulative(c) => c.steal(),
            Digest::External(e) => e.steal(),
            // Shadow hash, not the byte buffers — O(1) keying per §4.1.
            Digest::Paranoid(p) => p.shadow_steal(),
        }
    }

    /// `hash(state) -> u32`, for keying a group's children map. Folds
    /// the stolen bytes; collisions are fine, [`equal`] is the source of
    /// truth.
    pub fn hash_key(&self) -> u32 {
        let bytes = self.steal();
        let mut h: u32 = 2166136261;
        for b in bytes {
            h ^= b as u32;
            h = h.wrapping_mul(16777619);
        }
        h
    }

    pub fn equal(a: &Digest, b: &Digest) -> bool {
        match (a, b) {
            (Digest::Paranoid(pa), Digest::Paranoid(pb)) => ParanoidHandle::equal(pa, pb),
            _ => a.steal() == b.steal(),
        }
    }

    pub fn is_paranoid(&self) -> bool {
        matches!(self, Digest::Paranoid(_))
    }
}

/// Wrapper giving a [`Digest`] `Eq`/`Hash` via the capability's own
/// `equal`/`hash_key`, so it can key a group's children `HashMap`
/// directly instead of the engine reimplementing digest comparison.
pub struct DigestKey(pub Digest);

impl PartialEq for DigestKey {
    fn eq(&self, other: &Self) -> bool {
        Digest::equal(&self.0, &other.0)
    }
}
impl Eq for DigestKey {}

impl std::hash::Hash for DigestKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u32(self.0.hash_key());
    }
}
