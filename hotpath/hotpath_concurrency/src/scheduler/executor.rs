//! Single-thread batching executor.
//!
//! Producers append tasks to a wait list under a spin lock. The worker swaps
//! the whole wait list for its run list once per cycle, releases the lock and
//! runs the batch without holding it. When there is nothing to claim, the
//! worker parks on a monitor until a producer wakes it.

use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::Thread;
use std::time::Instant;

use hotpath_core::error::ExecutorError;
use hotpath_core::utils::ExecutorConfig;
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};

use super::thread_factory::{GroupThreadFactory, ThreadFactory};
use crate::sync::{Exclusive, SpinLock};

/// A unit of work. Receives the worker's local context and the timestamp of
/// the cycle it runs in.
pub type Task<C> = Box<dyn FnOnce(&mut C, Instant) + Send + 'static>;

/// Statistics about an executor
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Tasks handed to `execute`
    pub tasks_submitted: usize,

    /// Tasks that ran to completion
    pub tasks_executed: usize,

    /// Tasks that panicked
    pub tasks_panicked: usize,

    /// Cycles that ran at least one task
    pub cycles: usize,
}

struct Shared<C> {
    wait_list: Exclusive<Vec<Task<C>>, SpinLock>,
    waiting: AtomicBool,
    monitor: Mutex<()>,
    wakeup: Condvar,
    submitted: AtomicUsize,
    executed: AtomicUsize,
    panicked: AtomicUsize,
    cycles: AtomicUsize,
}

/// An executor backed by one dedicated worker thread.
///
/// Tasks run in submission order per producer, against a context `C` that is
/// built on the worker thread and never leaves it. Every task in a cycle sees
/// the same timestamp. A panicking task is logged and skipped; the rest of
/// its cycle still runs.
///
/// The worker runs for the life of the process. Dropping the executor leaves
/// it parked.
pub struct SingleThreadExecutor<C> {
    name: String,
    shared: Arc<Shared<C>>,
    worker: Thread,
}

impl<C: 'static> SingleThreadExecutor<C> {
    /// Start an executor whose worker is named after `config.name`.
    ///
    /// `local_factory` runs on the worker thread to build its context.
    pub fn new(
        config: &ExecutorConfig,
        local_factory: impl FnOnce() -> C + Send + 'static,
    ) -> Result<Self, ExecutorError> {
        let mut threads = GroupThreadFactory::new(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            threads = threads.with_stack_size(stack_size);
        }

        Self::with_thread_factory(config, &threads, local_factory)
    }

    /// Start an executor whose worker comes from `threads`.
    pub fn with_thread_factory(
        config: &ExecutorConfig,
        threads: &dyn ThreadFactory,
        local_factory: impl FnOnce() -> C + Send + 'static,
    ) -> Result<Self, ExecutorError> {
        let capacity = config.initial_queue_capacity;
        let shared = Arc::new(Shared {
            wait_list: Exclusive::with_lock(Vec::with_capacity(capacity), SpinLock::new()),
            waiting: AtomicBool::new(false),
            monitor: Mutex::new(()),
            wakeup: Condvar::new(),
            submitted: AtomicUsize::new(0),
            executed: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
            cycles: AtomicUsize::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = threads.new_thread(Box::new(move || {
            let local = local_factory();
            run_worker(worker_shared, local, capacity);
        }))?;

        debug!(
            "Started executor {} on thread {}",
            config.name,
            handle.thread().name().unwrap_or("<unnamed>")
        );

        Ok(Self {
            name: config.name.clone(),
            shared,
            worker: handle.thread().clone(),
        })
    }

    /// Queue `task` for the worker.
    pub fn execute(&self, task: impl FnOnce(&mut C, Instant) + Send + 'static) {
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.wait_list.write().push(Box::new(task));

        if self.shared.waiting.load(Ordering::SeqCst) {
            let _monitor = self.shared.monitor.lock();
            if self
                .shared
                .waiting
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.shared.wakeup.notify_all();
            }
        }
    }

    /// Submission with a result handle is not provided; this always fails.
    /// Use `execute`.
    pub fn submit(
        &self,
        _task: impl FnOnce(&mut C, Instant) + Send + 'static,
    ) -> Result<(), ExecutorError> {
        Err(ExecutorError::NotImplemented("submit"))
    }
}

impl<C> SingleThreadExecutor<C> {
    /// Name of the executor.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The worker thread.
    pub fn worker(&self) -> &Thread {
        &self.worker
    }

    /// Whether the worker is parked waiting for work.
    pub fn is_waiting(&self) -> bool {
        self.shared.waiting.load(Ordering::SeqCst)
    }

    /// Tasks queued but not yet claimed by the worker.
    pub fn pending(&self) -> usize {
        self.shared.wait_list.write().len()
    }

    /// Snapshot of the executor's counters.
    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            tasks_submitted: self.shared.submitted.load(Ordering::Relaxed),
            tasks_executed: self.shared.executed.load(Ordering::Relaxed),
            tasks_panicked: self.shared.panicked.load(Ordering::Relaxed),
            cycles: self.shared.cycles.load(Ordering::Relaxed),
        }
    }
}

fn run_worker<C>(shared: Arc<Shared<C>>, mut local: C, capacity: usize) {
    let mut run_list: Vec<Task<C>> = Vec::with_capacity(capacity);

    loop {
        {
            let mut wait_list = shared.wait_list.write();
            if wait_list.is_empty() {
                shared.waiting.store(true, Ordering::SeqCst);
            } else {
                mem::swap(&mut *wait_list, &mut run_list);
            }
        }

        if shared.waiting.load(Ordering::SeqCst) {
            let mut monitor = shared.monitor.lock();
            // Re-checked on every wakeup, spurious ones included.
            while shared.waiting.load(Ordering::SeqCst) {
                shared.wakeup.wait(&mut monitor);
            }
        }

        if run_list.is_empty() {
            continue;
        }

        let now = Instant::now();
        let cycle = shared.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("Cycle {}: running {} tasks", cycle, run_list.len());

        for task in run_list.drain(..) {
            let result = panic::catch_unwind(AssertUnwindSafe(|| task(&mut local, now)));

            match result {
                Ok(()) => {
                    shared.executed.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    shared.panicked.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Cycle {}: task panicked: {}",
                        cycle,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<unknown panic>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::thread_factory::ThreadBody;
    use crossbeam_channel::{bounded, unbounded};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config(name: &str) -> ExecutorConfig {
        ExecutorConfig {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + TIMEOUT;
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_tasks_run_in_order_on_worker() {
        let executor = SingleThreadExecutor::new(&config("ordered"), Vec::<u32>::new).unwrap();
        let (tx, rx) = unbounded();

        for i in 0..10u32 {
            let tx = tx.clone();
            executor.execute(move |seen: &mut Vec<u32>, _now| {
                seen.push(i);
                let thread_name = std::thread::current().name().map(str::to_string);
                tx.send((seen.clone(), thread_name)).unwrap();
            });
        }

        let mut last = None;
        for _ in 0..10 {
            last = Some(rx.recv_timeout(TIMEOUT).unwrap());
        }

        let (seen, thread_name) = last.unwrap();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(thread_name.as_deref(), Some("ordered-1"));
        assert_eq!(executor.worker().name(), Some("ordered-1"));
    }

    #[test]
    fn test_batched_tasks_share_timestamp() {
        let executor = SingleThreadExecutor::new(&config("batched"), || ()).unwrap();
        let (started_tx, started_rx) = bounded(1);
        let (release_tx, release_rx) = bounded::<()>(1);
        let (stamp_tx, stamp_rx) = unbounded();

        executor.execute(move |_, _| {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        started_rx.recv_timeout(TIMEOUT).unwrap();

        // The worker is busy, so both land in the same wait list.
        for label in ["a", "b"] {
            let stamp_tx = stamp_tx.clone();
            executor.execute(move |_, now| stamp_tx.send((label, now)).unwrap());
        }
        assert_eq!(executor.pending(), 2);
        release_tx.send(()).unwrap();

        let (first, a) = stamp_rx.recv_timeout(TIMEOUT).unwrap();
        let (second, b) = stamp_rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!((first, second), ("a", "b"));
        assert_eq!(a, b);

        wait_for(|| executor.stats().tasks_executed == 3);
        assert_eq!(executor.stats().cycles, 2);
    }

    #[test]
    fn test_panicking_task_does_not_stop_cycle() {
        let executor = SingleThreadExecutor::new(&config("panics"), || 0u32).unwrap();
        let (started_tx, started_rx) = bounded(1);
        let (release_tx, release_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = unbounded();

        executor.execute(move |_, _| {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        started_rx.recv_timeout(TIMEOUT).unwrap();

        executor.execute(|count, _| {
            *count += 1;
            panic!("broken task");
        });
        executor.execute(move |count, _| {
            *count += 1;
            done_tx.send(*count).unwrap();
        });
        release_tx.send(()).unwrap();

        assert_eq!(done_rx.recv_timeout(TIMEOUT).unwrap(), 2);
        wait_for(|| executor.stats().tasks_executed == 2);

        let stats = executor.stats();
        assert_eq!(stats.tasks_submitted, 3);
        assert_eq!(stats.tasks_panicked, 1);
    }

    #[test]
    fn test_worker_wakes_after_idle() {
        let executor = SingleThreadExecutor::new(&config("idle"), || ()).unwrap();
        wait_for(|| executor.is_waiting());

        let (tx, rx) = bounded(1);
        executor.execute(move |_, _| tx.send(()).unwrap());
        rx.recv_timeout(TIMEOUT).unwrap();

        wait_for(|| executor.is_waiting());
        let (tx, rx) = bounded(1);
        executor.execute(move |_, _| tx.send(()).unwrap());
        rx.recv_timeout(TIMEOUT).unwrap();
    }

    #[test]
    fn test_submit_not_implemented() {
        let executor = SingleThreadExecutor::new(&config("submit"), || ()).unwrap();
        let result = executor.submit(|_, _| {});
        assert!(matches!(
            result,
            Err(ExecutorError::NotImplemented("submit"))
        ));
        assert_eq!(executor.stats().tasks_submitted, 0);
    }

    #[test]
    fn test_spawn_failure_reported() {
        let failing = |_body: ThreadBody| -> std::io::Result<std::thread::JoinHandle<()>> {
            Err(std::io::Error::other("no threads"))
        };
        let result = SingleThreadExecutor::with_thread_factory(&config("none"), &failing, || ());
        assert!(matches!(result, Err(ExecutorError::SpawnFailed(_))));
    }
}
