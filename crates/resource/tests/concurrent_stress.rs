//! Concurrent stress test for the resource pool.
//!
//! Many threads doing acquire/release cycles, with some entries tainted
//! along the way, must never exceed capacity, deadlock, or leak/double-close
//! a connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use cistern_resource::pool::{PoolConfig, ResourcePool};
use cistern_resource::testing::MockFactory;

#[test]
fn stress_32_threads_never_exceed_capacity() {
    const CAPACITY: usize = 6;

    let factory = MockFactory::new("stress");
    let ledger = factory.ledger();
    ledger.set_create_delay(Duration::from_micros(200));
    let config = PoolConfig::default()
        .with_capacity(CAPACITY)
        .with_acquire_timeout(Duration::from_secs(10))
        .with_poll_interval(Duration::from_millis(5));
    let pool = ResourcePool::new(factory, config);

    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let cycles = Arc::new(AtomicU64::new(0));

    thread::scope(|s| {
        for worker in 0..32u64 {
            let pool = pool.clone();
            let ledger = ledger.clone();
            let in_use = Arc::clone(&in_use);
            let peak = Arc::clone(&peak);
            let cycles = Arc::clone(&cycles);
            s.spawn(move || {
                for i in 0..25u64 {
                    let guard = pool.acquire().expect("worker should acquire");
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);

                    if (worker + i) % 7 == 0 {
                        ledger.report_error(guard.id());
                    }
                    thread::sleep(Duration::from_micros(300));

                    in_use.fetch_sub(1, Ordering::SeqCst);
                    drop(guard);
                    cycles.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(cycles.load(Ordering::SeqCst), 32 * 25);
    assert!(
        peak.load(Ordering::SeqCst) <= CAPACITY,
        "peak concurrent checkouts {} exceeded capacity",
        peak.load(Ordering::SeqCst)
    );

    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.pending, 0);
    assert!(stats.idle <= CAPACITY);
    assert_eq!(stats.acquisitions, 32 * 25);
    assert!(stats.discarded > 0, "tainted entries should have been discarded");

    pool.close();
    assert!(ledger.unclosed().is_empty(), "leaked: {:?}", ledger.unclosed());
    assert!(ledger.closed_twice().is_empty());
}

#[test]
fn stress_with_failing_creations_keeps_bookkeeping_consistent() {
    let factory = MockFactory::new("flaky");
    let ledger = factory.ledger();
    let pool = ResourcePool::new(
        factory,
        PoolConfig::default()
            .with_capacity(3)
            .with_acquire_timeout(Duration::from_secs(5)),
    );

    let failures = AtomicU64::new(0);
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for i in 0..20 {
                    if i % 5 == 0 {
                        ledger.fail_next_creates(1);
                    }
                    match pool.acquire() {
                        Ok(guard) => {
                            thread::sleep(Duration::from_micros(200));
                            drop(guard);
                        }
                        Err(_) => {
                            failures.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            });
        }
    });

    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(
        stats.acquisitions + failures.load(Ordering::SeqCst),
        8 * 20,
        "every call either acquired or surfaced the factory error"
    );
    assert_eq!(stats.created, (stats.idle as u64) + stats.discarded);
}
