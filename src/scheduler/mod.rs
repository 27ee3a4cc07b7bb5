//! Multi-disk scheduler (component C, §4.3).
//!
//! One [`Device`] per physical disk. Workers sort staged tasks by
//! `(dev, offset)` each pass (the "elevator") and dispatch up to
//! `pass_quota` of them before yielding the disk arm to a sibling
//! device. The scheduler never surfaces its own errors (§7): a device
//! that fails to start a thread logs and proceeds with fewer threads.

#[cfg(test)]
mod tests;

use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::abort::AbortFlag;
use crate::logger::Logger;
use crate::mount::DiskId;

/// A unit of scheduler work: hand `path`/`offset` to the task handler
/// (the shred engine) via `Mds::configure`'s `func`.
pub struct ScheduledTask {
    pub dev: DiskId,
    pub offset: u64,
    pub path: PathBuf,
    pub user_data: usize,
}

/// What the task handler tells the worker to do with the task it was
/// just given (§4.3 step 3: "a return of 1 consumes quota, 0 means the
/// handler deferred and the task was re-pushed"). `Consumed` drops the
/// task; `Deferred` hands it back so the worker re-stages it.
pub enum Disposition {
    Consumed,
    Deferred(ScheduledTask),
}

/// `(dev, offset)` lexicographic compare — the elevator ordering.
fn priority_cmp(a: &ScheduledTask, b: &ScheduledTask) -> CmpOrdering {
    (a.dev.0, a.offset).cmp(&(b.dev.0, b.offset))
}

struct DeviceState {
    unsorted: Vec<ScheduledTask>,
    sorted: VecDeque<ScheduledTask>,
}

/// One physical disk. Non-rotational disks still get a `Device`, just
/// marked `is_rotational = false` (§4.3 "Model").
pub struct Device {
    pub id: DiskId,
    pub is_rotational: bool,
    refcount: AtomicI64,
    thread_count: AtomicUsize,
    state: Mutex<DeviceState>,
    cond: Condvar,
}

impl Device {
    fn new(id: DiskId, is_rotational: bool) -> Arc<Device> {
        Arc::new(Device {
            id,
            is_rotational,
            refcount: AtomicI64::new(0),
            thread_count: AtomicUsize::new(0),
            state: Mutex::new(DeviceState {
                unsorted: Vec::new(),
                sorted: VecDeque::new(),
            }),
            cond: Condvar::new(),
        })
    }

    /// `Device::push_task(device, dev, offset, path, user_data)`.
    pub fn push_task(&self, task: ScheduledTask) {
        let mut state = self.state.lock().unwrap();
        state.unsorted.push(task);
        self.cond.notify_all();
    }

    /// `Device::ref(delta)`.
    pub fn add_ref(&self, delta: i64) {
        self.refcount.fetch_add(delta, Ordering::SeqCst);
        self.cond.notify_all();
    }

    fn refcount(&self) -> i64 {
        self.refcount.load(Ordering::SeqCst)
    }
}

type TaskHandler = Arc<dyn Fn(ScheduledTask) -> Disposition + Send + Sync>;

/// `Mds::new`/`configure`/`start`/`finish` (§4.3).
pub struct Mds {
    max_threads: usize,
    threads_per_disk: AtomicUsize,
    pass_quota: AtomicUsize,
    devices: Mutex<Vec<Arc<Device>>>,
    handler: Mutex<Option<TaskHandler>>,
    abort: AbortFlag,
    logger: Arc<dyn Logger>,
    active_threads: Arc<AtomicUsize>,
    finished_cond: Arc<Condvar>,
    finished_mutex: Arc<Mutex<()>>,
}

impl Mds {
    pub fn new(max_threads: usize, abort: AbortFlag, logger: Arc<dyn Logger>) -> Arc<Mds> {
        Arc::new(Mds {
            max_threads,
            threads_per_disk: AtomicUsize::new(1),
            pass_quota: AtomicUsize::new(16),
            devices: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
            abort,
            logger,
            active_threads: Arc::new(AtomicUsize::new(0)),
            finished_cond: Arc::new(Condvar::new()),
            finished_mutex: Arc::new(Mutex::new(())),
        })
    }

    /// `Mds::configure(func, user_data, pass_quota, threads_per_disk, priority_cmp)`.
    /// `priority_cmp` itself is fixed to the `(dev, offset)` elevator order
    /// (§4.3); only the handler and the two tunables are configurable here.
    pub fn configure(&self, threads_per_disk: usize, pass_quota: usize, handler: TaskHandler) {
        *self.handler.lock().unwrap() = Some(handler);
        self.threads_per_disk.store(threads_per_disk.max(1), Ordering::SeqCst);
        self.pass_quota.store(pass_quota.max(1), Ordering::SeqCst);
    }

    pub fn register_device(self: &Arc<Self>, id: DiskId, is_rotational: bool) -> Arc<Device> {
        let device = Device::new(id, is_rotational);
        self.devices.lock().unwrap().push(device.clone());
        device
    }

    /// Looks up an already-registered device by id, or registers one and
    /// spawns its worker pool immediately. Unlike `register_device` +
    /// `start`, this lets callers add devices one at a time to a scheduler
    /// whose other devices are already running (the shred engine
    /// discovers disks incrementally as it sees new files).
    pub fn ensure_device(self: &Arc<Self>, id: DiskId, is_rotational: bool) -> Arc<Device> {
        {
            let devices = self.devices.lock().unwrap();
            if let Some(existing) = devices.iter().find(|d| d.id == id) {
                return existing.clone();
            }
        }
        let device = Device::new(id, is_rotational);
        self.devices.lock().unwrap().push(device.clone());
        device.add_ref(1);
        let per_disk = self.threads_per_disk.load(Ordering::SeqCst).max(1);
        for _ in 0..per_disk {
            if self.active_threads.load(Ordering::SeqCst) >= self.max_threads {
                self.logger.warn("device thread pool at capacity, starting with fewer threads");
                break;
            }
            self.spawn_worker(device.clone());
        }
        device
    }

    /// Launches `threads_per_disk` workers per registered device into a
    /// shared pool sized up to `max_threads`.
    pub fn start(self: &Arc<Self>) {
        let devices = self.devices.lock().unwrap().clone();
        let per_disk = self.threads_per_disk.load(Ordering::SeqCst).max(1);
        for device in devices {
            device.add_ref(1);
            for _ in 0..per_disk {
                if self.active_threads.load(Ordering::SeqCst) >= self.max_threads {
                    self.logger.warn("device thread pool at capacity, starting with fewer threads");
                    break;
                }
                self.spawn_worker(device.clone());
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>, device: Arc<Device>) {
        device.thread_count.fetch_add(1, Ordering::SeqCst);
        self.active_threads.fetch_add(1, Ordering::SeqCst);
        let mds = self.clone();
        let device_for_thread = device.clone();
        let built = std::thread::Builder::new().spawn(move || mds.worker_loop(device_for_thread));
        if built.is_err() {
            self.logger.warn("failed to start device worker thread, continuing with fewer threads");
            device.thread_count.fetch_sub(1, Ordering::SeqCst);
            self.active_threads.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn worker_loop(self: Arc<Self>, device: Arc<Device>) {
        loop {
            if self.abort.is_set() {
                break;
            }
            {
                let mut state = device.state.lock().unwrap();
                if state.unsorted.is_empty() && state.sorted.is_empty() {
                    if device.refcount() <= 0 {
                        drop(state);
                        break;
                    }
                    let (guard, _timeout) = device
                        .cond
                        .wait_timeout(state, Duration::from_millis(50))
                        .unwrap();
                    state = guard;
                }

                if !state.unsorted.is_empty() {
                    let mut drained: Vec<ScheduledTask> = state.unsorted.drain(..).collect();
                    drained.sort_by(priority_cmp);
                    state.sorted.extend(drained);
                }
            }

            let handler = self.handler.lock().unwrap().clone();
            let Some(handler) = handler else { continue };

            let pass_quota = self.pass_quota.load(Ordering::SeqCst);
            let mut dispatched = 0;
            while dispatched < pass_quota {
                let task = {
                    let mut state = device.state.lock().unwrap();
                    state.sorted.pop_front()
                };
                let Some(task) = task else { break };
                match handler(task) {
                    Disposition::Consumed => dispatched += 1,
                    Disposition::Deferred(task) => {
                        device.state.lock().unwrap().unsorted.push(task);
                        dispatched += 1;
                    }
                }
            }

            if device.refcount() <= 0 {
                let remaining = {
                    let state = device.state.lock().unwrap();
                    state.unsorted.is_empty() && state.sorted.is_empty()
                };
                if remaining {
                    break;
                }
            }
        }

        device.thread_count.fetch_sub(1, Ordering::SeqCst);
        if self.active_threads.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = self.finished_mutex.lock().unwrap();
            self.finished_cond.notify_all();
        }
    }

    /// Signals every device that no more work is coming and waits for
    /// every worker thread to join.
    pub fn finish(self: &Arc<Self>) {
        let devices = self.devices.lock().unwrap().clone();
        for device in &devices {
            device.add_ref(-1);
        }
        let guard = self.finished_mutex.lock().unwrap();
        let _ = self
            .finished_cond
            .wait_timeout_while(guard, Duration::from_secs(30), |_| {
                self.active_threads.load(Ordering::SeqCst) > 0
            });
    }
}
