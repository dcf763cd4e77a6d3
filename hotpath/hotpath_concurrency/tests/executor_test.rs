//! Integration tests for the single-thread executor.

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded};
use hotpath_concurrency::{CleanupRegistry, CountedPool, GroupThreadFactory, SingleThreadExecutor};
use hotpath_core::error::ExecutorError;
use hotpath_core::ExecutorConfig;

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn test_same_producer_batch_shares_timestamp() {
    let config = ExecutorConfig {
        name: "ticks".to_string(),
        ..Default::default()
    };
    let executor = SingleThreadExecutor::new(&config, || ()).unwrap();

    let (busy_tx, busy_rx) = bounded(1);
    let (go_tx, go_rx) = bounded::<()>(1);
    executor.execute(move |_, _| {
        busy_tx.send(()).unwrap();
        go_rx.recv().unwrap();
    });
    busy_rx.recv_timeout(TIMEOUT).unwrap();

    let (tx, rx) = unbounded();
    let tx_b = tx.clone();
    executor.execute(move |_, now| tx.send(('A', now)).unwrap());
    executor.execute(move |_, now| tx_b.send(('B', now)).unwrap());
    go_tx.send(()).unwrap();

    let a = rx.recv_timeout(TIMEOUT).unwrap();
    let b = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(a.0, 'A');
    assert_eq!(b.0, 'B');
    assert_eq!(a.1, b.1);
}

#[test]
fn test_per_producer_fifo() {
    let threads = GroupThreadFactory::new("fifo-group");
    let executor = SingleThreadExecutor::with_thread_factory(
        &ExecutorConfig::default(),
        &threads,
        HashMap::<usize, Vec<usize>>::new,
    )
    .unwrap();
    let (tx, rx) = bounded(1);

    thread::scope(|scope| {
        for producer in 0..4usize {
            let executor = &executor;
            scope.spawn(move || {
                for seq in 0..500usize {
                    executor.execute(move |seen: &mut HashMap<usize, Vec<usize>>, _| {
                        seen.entry(producer).or_default().push(seq);
                    });
                }
            });
        }
    });

    executor.execute(move |seen, _| tx.send(seen.clone()).unwrap());
    let seen = rx.recv_timeout(TIMEOUT).unwrap();

    assert_eq!(seen.len(), 4);
    for sequence in seen.values() {
        assert_eq!(*sequence, (0..500).collect::<Vec<_>>());
    }
    assert_eq!(executor.worker().name(), Some("fifo-group-1"));
}

#[test]
fn test_executor_releases_counted_objects() {
    #[derive(Default)]
    struct Job {
        id: u32,
    }
    impl hotpath_concurrency::Reusable for Job {
        fn free(&mut self) {
            self.id = 0;
        }
    }

    let pool = CountedPool::new(Job::default);
    let executor = SingleThreadExecutor::new(&ExecutorConfig::default(), || 0u32).unwrap();
    let (tx, rx) = bounded(1);

    for id in 1..=3 {
        let job = pool.acquire_with_uses(1).unwrap();
        job.payload_mut().id = id;
        executor.execute(move |sum: &mut u32, _| {
            *sum += job.payload().id;
            job.complete().unwrap();
        });
    }
    executor.execute(move |sum, _| tx.send(*sum).unwrap());

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 6);
    let deadline = Instant::now() + TIMEOUT;
    while pool.idle_count() == 0 {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(1));
    }
    assert!(pool.idle_count() >= 1);
}

#[test]
fn test_submit_always_fails() {
    let executor = SingleThreadExecutor::new(&ExecutorConfig::default(), || ()).unwrap();
    assert!(matches!(
        executor.submit(|_, _| {}),
        Err(ExecutorError::NotImplemented(_))
    ));
}

#[test]
fn test_cleanup_registry_run_on_executor() {
    let executor = SingleThreadExecutor::new(&ExecutorConfig::default(), || {
        let registry: CleanupRegistry = CleanupRegistry::new();
        registry.register("Purged {count} stale entries", || Ok(12));
        registry
    })
    .unwrap();
    let (tx, rx) = bounded(1);

    executor.execute(move |registry, _| tx.send(registry.run()).unwrap());
    let report = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(report.total_cleaned(), 12);
}
