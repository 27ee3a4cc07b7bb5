//! Memory governor for paranoid mode (§4.5): paranoid digests keep every
//! byte they've seen in memory, so admission is capped by a shared
//! budget rather than by the per-device buffer semaphore the hasher
//! pipeline (component B) uses for ordinary reads.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct MemoryGovernor {
    budget_bytes: u64,
    used_bytes: AtomicU64,
}

impl MemoryGovernor {
    pub fn new(budget_bytes: u64) -> Self {
        MemoryGovernor {
            budget_bytes,
            used_bytes: AtomicU64::new(0),
        }
    }

    /// Try to reserve `len` bytes of paranoid buffer space. Returns
    /// `false` (admission denied) rather than blocking — the caller
    /// falls back to treating this increment as non-paranoid-admissible
    /// and waits for a future increment once space frees up.
    pub fn try_reserve(&self, len: u64) -> bool {
        let mut current = self.used_bytes.load(Ordering::Acquire);
        loop {
            if current.saturating_add(len) > self.budget_bytes {
                return false;
            }
            match self.used_bytes.compare_exchange_weak(
                current,
                current + len,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn release(&self, len: u64) {
        self.used_bytes.fetch_sub(len, Ordering::AcqRel);
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Acquire)
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }
}
