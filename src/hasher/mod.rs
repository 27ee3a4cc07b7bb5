//! Hasher pipeline (component B, §4.2).
//!
//! Reading happens on the caller's thread (the scheduler's worker,
//! component C) because rotational-disk throughput collapses under
//! concurrent reads. Each [`Task`] owns a digest behind a mutex and
//! feeds it to one of a small, fixed set of *per-digest serial worker*
//! channels — one thread per channel, so update ordering for a given
//! file is preserved as long as the task always posts to the same
//! worker, which it does for its whole lifetime.

mod semaphore;

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Sender};

use crate::abort::AbortFlag;
use crate::digest::Digest;

pub use semaphore::BufferSemaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Sequential `read()` with advisory readahead.
    Buffered,
    /// Vectored `preadv`-style reads of a few buffers at a time.
    Preadv,
    /// Read the link target text, not the pointed-to file.
    Symlink,
}

enum HashMsg {
    Update(Arc<Mutex<Digest>>, Vec<u8>),
    Finish(Arc<Mutex<Digest>>, Sender<()>),
}

/// Owns the bounded set of per-digest serial worker pools and the
/// buffer-allocation semaphore.
pub struct Hasher {
    workers: Vec<Sender<HashMsg>>,
    next_worker: AtomicUsize,
    buf_sem: Arc<BufferSemaphore>,
    buffer_bytes: usize,
    read_mode: ReadMode,
    abort: AbortFlag,
}

impl Hasher {
    pub fn new(max_concurrency: usize, read_mode: ReadMode, buffer_bytes: usize, abort: AbortFlag) -> Self {
        let multiplier = if read_mode == ReadMode::Preadv { 256 } else { 64 };
        let buf_sem = Arc::new(BufferSemaphore::new(max_concurrency * multiplier));

        let mut workers = Vec::with_capacity(max_concurrency);
        for _ in 0..max_concurrency {
            let (tx, rx) = unbounded::<HashMsg>();
            std::thread::spawn(move || {
                for msg in rx {
                    match msg {
                        HashMsg::Update(digest, bytes) => {
                            digest.lock().unwrap().update(&bytes);
                        }
                        HashMsg::Finish(_digest, done) => {
                            let _ = done.send(());
                        }
                    }
                }
            });
            workers.push(tx);
        }

        Hasher {
            workers,
            next_worker: AtomicUsize::new(0),
            buf_sem,
            buffer_bytes,
            read_mode,
            abort,
        }
    }

    /// `Task::new(hasher, digest_or_null, user_data)`. A task is pinned
    /// to one worker channel for its entire lifetime.
    pub fn new_task(&self, digest: Digest) -> Task {
        let idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        Task {
            worker: self.workers[idx].clone(),
            buf_sem: self.buf_sem.clone(),
            digest: Arc::new(Mutex::new(digest)),
            buffer_bytes: self.buffer_bytes,
            read_mode: self.read_mode,
            abort: self.abort.clone(),
        }
    }
}

pub struct Task {
    worker: Sender<HashMsg>,
    buf_sem: Arc<BufferSemaphore>,
    digest: Arc<Mutex<Digest>>,
    buffer_bytes: usize,
    read_mode: ReadMode,
    abort: AbortFlag,
}

impl Task {
    /// `Task::hash(task, path, start, len, is_symlink) -> Result<bytes_read>`.
    pub fn hash(&mut self, path: &Path, start: u64, len: u64, is_symlink: bool) -> io::Result<u64> {
        if is_symlink || self.read_mode == ReadMode::Symlink {
            return self.hash_symlink(path);
        }
        match self.read_mode {
            ReadMode::Buffered => self.hash_buffered(path, start, len),
            ReadMode::Preadv => self.hash_preadv(path, start, len),
            ReadMode::Symlink => unreachable!(),
        }
    }

    fn hash_symlink(&mut self, path: &Path) -> io::Result<u64> {
        let target = std::fs::read_link(path)?;
        let bytes = target.as_os_str().as_encoded_bytes().to_vec();
        let n = bytes.len() as u64;
        self.buf_sem.acquire();
        self.post_update(bytes);
        self.buf_sem.release();
        Ok(n)
    }

    /// Above this increment size, mapping the range beats a syscall-per-buffer
    /// read loop (amortizes the page faults instead of the read() calls) —
    /// the same threshold `common/io.rs`'s `read_file_bytes` uses for its
    /// mmap-vs-buffered choice.
    const MMAP_THRESHOLD: u64 = 64 * 1024;

    fn hash_buffered(&mut self, path: &Path, start: u64, len: u64) -> io::Result<u64> {
        if len >= Self::MMAP_THRESHOLD {
            return self.hash_mmap(path, start, len);
        }
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        let mut remaining = len;
        let mut total = 0u64;
        let mut buf = vec![0u8; self.buffer_bytes];
        while remaining > 0 {
            if self.abort.is_set() {
                break;
            }
            let want = remaining.min(self.buffer_bytes as u64) as usize;
            self.buf_sem.acquire();
            let n = file.read(&mut buf[..want])?;
            if n == 0 {
                self.buf_sem.release();
                break;
            }
            self.post_update(buf[..n].to_vec());
            self.buf_sem.release();
            total += n as u64;
            remaining -= n as u64;
        }
        Ok(total)
    }

    /// Maps the increment into memory and feeds it to the digest in
    /// `buffer_bytes`-sized pieces, releasing the semaphore slot only once
    /// the mapping is dropped — the mapped range counts against the same
    /// concurrency budget a buffered read's buffer would.
    fn hash_mmap(&mut self, path: &Path, start: u64, len: u64) -> io::Result<u64> {
        let file = File::open(path)?;
        self.buf_sem.acquire();
        let result = (|| -> io::Result<u64> {
            let mmap = unsafe { memmap2::Mmap::map(&file)? };
            if start >= mmap.len() as u64 {
                return Ok(0);
            }
            let end = (start + len).min(mmap.len() as u64);
            let slice = &mmap[start as usize..end as usize];
            for chunk in slice.chunks(self.buffer_bytes.max(1)) {
                if self.abort.is_set() {
                    break;
                }
                self.post_update(chunk.to_vec());
            }
            Ok(slice.len() as u64)
        })();
        self.buf_sem.release();
        result
    }

    /// Vectored reads of a few buffers at a time to amortize syscalls.
    const PREADV_BATCH: usize = 4;

    fn hash_preadv(&mut self, path: &Path, start: u64, len: u64) -> io::Result<u64> {
        let file = File::open(path)?;
        let mut offset = start;
        let end = start + len;
        let mut total = 0u64;
        while offset < end {
            if self.abort.is_set() {
                break;
            }
            let batch_len = (end - offset).min((self.buffer_bytes * Self::PREADV_BATCH) as u64);
            let mut buf = vec![0u8; batch_len as usize];
            self.buf_sem.acquire();
            let n = file.read_at(&mut buf, offset)?;
            if n == 0 {
                self.buf_sem.release();
                break;
            }
            buf.truncate(n);
            for chunk in buf.chunks(self.buffer_bytes) {
                self.post_update(chunk.to_vec());
            }
            self.buf_sem.release();
            offset += n as u64;
            total += n as u64;
        }
        Ok(total)
    }

    fn post_update(&self, bytes: Vec<u8>) {
        let _ = self.worker.send(HashMsg::Update(self.digest.clone(), bytes));
    }

    /// `Task::finish(task) -> Digest`. Pushes the completion sentinel and
    /// blocks on a one-shot channel until every prior update has been
    /// applied by the worker, so the returned digest is consistent.
    pub fn finish(self) -> Digest {
        let (tx, rx) = crossbeam_channel::bounded(0);
        let _ = self.worker.send(HashMsg::Finish(self.digest.clone(), tx));
        let _ = rx.recv();
        Arc::try_unwrap(self.digest)
            .map(|m| m.into_inner().unwrap())
            .unwrap_or_else(|shared| shared.lock().unwrap().clone_state())
    }
}
