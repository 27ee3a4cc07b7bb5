//! Counting semaphore bounding outstanding read buffers (§4.2), sized
//! `max_concurrency × 64` (buffered) or `× 256` (preadv) so fast disks
//! can't outrun the per-digest hash workers.

use std::sync::{Condvar, Mutex};

pub struct BufferSemaphore {
    state: Mutex<usize>,
    cond: Condvar,
}

impl BufferSemaphore {
    pub fn new(permits: usize) -> Self {
        BufferSemaphore {
            state: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    pub fn acquire(&self) {
        let mut guard = self.state.lock().unwrap();
        while *guard == 0 {
            guard = self.cond.wait(guard).unwrap();
        }
        *guard -= 1;
    }

    pub fn release(&self) {
        let mut guard = self.state.lock().unwrap();
        *guard += 1;
        self.cond.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_blocks_until_release() {
        let sem = Arc::new(BufferSemaphore::new(1));
        sem.acquire();
        let sem2 = sem.clone();
        let handle = thread::spawn(move || {
            sem2.acquire();
        });
        thread::sleep(std::time::Duration::from_millis(20));
        sem.release();
        handle.join().unwrap();
    }
}
