//! Paranoid (byte-exact) digest mode (component E, §4.5).
//!
//! A paranoid digest keeps every byte it has seen so it can be compared
//! byte-for-byte, while a shadow hash runs alongside it so keying
//! ([`Digest::hash_key`](crate::digest::Digest::hash_key)/`steal`) stays
//! O(1). The twin-candidate mechanism lets two files be pre-compared
//! while their data is still streaming in, so the expensive byte compare
//! is usually already resolved by the time it's needed.

pub mod governor;

#[cfg(test)]
mod tests;

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

struct Inner {
    buffers: Vec<Arc<[u8]>>,
    total_len: u64,
    shadow: blake2b_simd::State,
    twin: Option<ParanoidHandle>,
    rejects: HashSet<u64>,
    incoming: VecDeque<ParanoidHandle>,
    released: bool,
}

/// Cheap, cloneable handle to a paranoid digest's shared state.
#[derive(Clone)]
pub struct ParanoidHandle {
    id: u64,
    inner: Arc<Mutex<Inner>>,
}

/// Result of checking a file's digest against an existing child group's
/// template when both are paranoid (§4.5, §7 `ParanoidCollision`).
pub enum ParanoidVerdict {
    Match,
    Mismatch,
    /// Shadow hashes agree but the byte streams don't — the file-identity
    /// invariant has been violated.
    Collision,
}

impl ParanoidHandle {
    pub fn new() -> Self {
        ParanoidHandle {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            inner: Arc::new(Mutex::new(Inner {
                buffers: Vec::new(),
                total_len: 0,
                shadow: blake2b_simd::State::new(),
                twin: None,
                rejects: HashSet::new(),
                incoming: VecDeque::new(),
                released: false,
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// §3's "template digest cloned into newcomers", specialized for
    /// paranoid: a fresh handle that immediately registers `self` as a
    /// twin candidate, so comparison starts as soon as bytes arrive.
    pub fn clone_as_twin(&self) -> ParanoidHandle {
        let fresh = ParanoidHandle::new();
        fresh.queue_incoming(self.clone());
        fresh
    }

    pub fn queue_incoming(&self, candidate: ParanoidHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.incoming.push_back(candidate);
    }

    /// Streaming update: update the shadow hash, append the buffer,
    /// advance or eject the twin candidate, and drain the incoming
    /// candidate queue (§4.5 "Streaming equality").
    pub fn update_bytes(&self, bytes: &[u8]) {
        let buf: Arc<[u8]> = Arc::from(bytes);
        let twin;
        let incoming: Vec<ParanoidHandle>;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.shadow.update(bytes);
            inner.buffers.push(buf.clone());
            inner.total_len += bytes.len() as u64;
            twin = inner.twin.clone();
            incoming = inner.incoming.drain(..).collect();
        }

        if let Some(t) = twin {
            let idx = self.buffered_len() - 1;
            if !buffer_matches(&t, idx, &buf) {
                let mut inner = self.inner.lock().unwrap();
                inner.rejects.insert(t.id());
                inner.twin = None;
            }
        }

        for cand in incoming {
            if self.rejects_contains(cand.id()) {
                continue;
            }
            if bytes_prefix_equal(self, &cand) {
                let mut inner = self.inner.lock().unwrap();
                if inner.twin.is_none() {
                    inner.twin = Some(cand);
                }
            } else {
                let mut inner = self.inner.lock().unwrap();
                inner.rejects.insert(cand.id());
            }
        }
    }

    pub fn mark_released(&self) {
        self.inner.lock().unwrap().released = true;
    }

    pub fn shadow_steal(&self) -> Vec<u8> {
        self.inner
            .lock()
            .unwrap()
            .shadow
            .clone()
            .finalize()
            .as_bytes()
            .to_vec()
    }

    fn buffered_len(&self) -> usize {
        self.inner.lock().unwrap().buffers.len()
    }

    fn rejects_contains(&self, id: u64) -> bool {
        self.inner.lock().unwrap().rejects.contains(&id)
    }

    fn bytes_so_far(&self) -> Vec<u8> {
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::with_capacity(inner.total_len as usize);
        for b in &inner.buffers {
            out.extend_from_slice(b);
        }
        out
    }

    fn is_released(&self) -> bool {
        self.inner.lock().unwrap().released
    }

    /// §4.5 `equal(a, b)`: shadow-only once either side has released its
    /// buffers (finalized group), otherwise a full byte-chain compare.
    pub fn equal(a: &ParanoidHandle, b: &ParanoidHandle) -> bool {
        if a.id == b.id {
            return true;
        }
        if a.rejects_contains(b.id) || b.rejects_contains(a.id) {
            return false;
        }
        if a.is_released() || b.is_released() {
            return a.shadow_steal() == b.shadow_steal();
        }
        a.bytes_so_far() == b.bytes_so_far()
    }

    /// Used by the shred engine when routing a file into an *existing*
    /// paranoid child group: shadow hashes already match (that's how the
    /// candidate bucket was found), so a byte mismatch here is not a
    /// normal "different file" outcome — it's a shadow-hash collision.
    pub fn verdict_against_template(candidate: &ParanoidHandle, template: &ParanoidHandle) -> ParanoidVerdict {
        if candidate.shadow_steal() != template.shadow_steal() {
            return ParanoidVerdict::Mismatch;
        }
        if ParanoidHandle::equal(candidate, template) {
            ParanoidVerdict::Match
        } else {
            ParanoidVerdict::Collision
        }
    }
}

impl Default for ParanoidHandle {
    fn default() -> Self {
        ParanoidHandle::new()
    }
}

fn buffer_matches(twin: &ParanoidHandle, idx: usize, buf: &[u8]) -> bool {
    let inner = twin.inner.lock().unwrap();
    match inner.buffers.get(idx) {
        Some(existing) => existing.as_ref() == buf,
        // Twin hasn't buffered this far yet — nothing to contradict.
        None => true,
    }
}

fn bytes_prefix_equal(a: &ParanoidHandle, b: &ParanoidHandle) -> bool {
    let a_bytes = a.bytes_so_far();
    let b_bytes = b.bytes_so_far();
    let n = a_bytes.len().min(b_bytes.len());
    a_bytes[..n] == b_bytes[..n]
}
