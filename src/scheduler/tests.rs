use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use super::*;
use crate::logger::NullLogger;

#[test]
fn elevator_orders_by_device_then_offset() {
    let mut tasks = vec![
        ScheduledTask { dev: DiskId(1), offset: 50, path: PathBuf::from("b"), user_data: 0 },
        ScheduledTask { dev: DiskId(1), offset: 10, path: PathBuf::from("a"), user_data: 0 },
        ScheduledTask { dev: DiskId(0), offset: 99, path: PathBuf::from("c"), user_data: 0 },
    ];
    tasks.sort_by(priority_cmp);
    let order: Vec<(u64, u64)> = tasks.iter().map(|t| (t.dev.0, t.offset)).collect();
    assert_eq!(order, vec![(0, 99), (1, 10), (1, 50)]);
}

#[test]
fn all_tasks_dispatched_across_one_pass() {
    let mds = Mds::new(4, AbortFlag::new(), Arc::new(NullLogger));
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();
    mds.configure(
        1,
        16,
        Arc::new(move |task: ScheduledTask| {
            seen_clone.lock().unwrap().push(task.offset);
            count_clone.fetch_add(1, Ordering::SeqCst);
            Disposition::Consumed
        }),
    );
    let device = mds.register_device(DiskId(0), true);
    for offset in [30, 10, 20] {
        device.push_task(ScheduledTask {
            dev: DiskId(0),
            offset,
            path: PathBuf::from("f"),
            user_data: 0,
        });
    }
    mds.start();
    mds.finish();
    assert_eq!(count.load(Ordering::SeqCst), 3);
}
