//! Cumulative digest variant (§4.1): `update(a); update(b)` and
//! `update(b); update(a)` must steal equal. Achieved by xor-accumulating
//! a strong per-chunk hash into a fixed-size lane array — xor is
//! commutative and associative, so call order never matters.

const LANES: usize = 64;

#[derive(Clone)]
pub struct CumulativeState {
    acc: [u8; LANES],
}

impl CumulativeState {
    pub fn new(seed: u64) -> Self {
        let mut acc = [0u8; LANES];
        acc[..8].copy_from_slice(&seed.to_le_bytes());
        CumulativeState { acc }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        let chunk_hash = blake2b_simd::blake2b(bytes);
        for (a, b) in self.acc.iter_mut().zip(chunk_hash.as_bytes()) {
            *a ^= b;
        }
    }

    pub fn steal(&self) -> Vec<u8> {
        self.acc.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_independent() {
        let mut ab = CumulativeState::new(0);
        ab.update(b"hello");
        ab.update(b"world");

        let mut ba = CumulativeState::new(0);
        ba.update(b"world");
        ba.update(b"hello");

        assert_eq!(ab.steal(), ba.steal());
    }

    #[test]
    fn different_inputs_differ() {
        let mut a = CumulativeState::new(0);
        a.update(b"hello");
        let mut b = CumulativeState::new(0);
        b.update(b"goodbye");
        assert_ne!(a.steal(), b.steal());
    }
}
