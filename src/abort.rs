//! User-cancellation flag (§5 "Cancellation", SPEC_FULL §5.1).
//!
//! A construction-time capability rather than a process-wide global,
//! per the Design Notes' rejection of global mutable state: the CLI
//! owns the `Arc`, installs the `ctrlc` handler, and threads the same
//! flag into the scheduler, hasher, and shred engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        AbortFlag(Arc::new(AtomicBool::new(false)))
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}
