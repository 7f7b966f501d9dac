//! Pool exhaustion: blocking acquire, deadlines and wakeups.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use cistern_resource::error::Error;
use cistern_resource::pool::{PoolConfig, ResourcePool};
use cistern_resource::testing::MockFactory;

fn pool(capacity: usize, timeout: Duration) -> ResourcePool<MockFactory> {
    let config = PoolConfig::default()
        .with_capacity(capacity)
        .with_acquire_timeout(timeout);
    ResourcePool::new(MockFactory::new("test-pool"), config)
}

#[test]
fn second_acquire_blocks_until_release() {
    let pool = pool(1, Duration::from_secs(5));
    let first = pool.acquire().expect("first acquire should succeed");
    let first_id = first.id();

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || {
            let guard = pool.acquire().expect("waiter should eventually acquire");
            tx.send(guard.id()).unwrap();
        })
    };

    assert!(
        rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "waiter must stay blocked while the only entry is checked out"
    );

    drop(first);
    let got = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("waiter should be woken by the release");
    assert_eq!(got, first_id, "released entry should be handed to the waiter");
    waiter.join().unwrap();
}

#[test]
fn exhausted_pool_times_out_near_deadline() {
    let pool = pool(1, Duration::from_secs(1));
    let _held = pool.acquire().unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || {
            let start = Instant::now();
            let result = pool.acquire();
            (result.map(|g| g.id()), start.elapsed())
        })
    };
    let (result, elapsed) = waiter.join().unwrap();

    let err = result.unwrap_err();
    assert!(
        matches!(err, Error::AcquireTimeout { timeout_ms: 1000, .. }),
        "expected AcquireTimeout, got: {err:?}"
    );
    assert!(err.is_retryable(), "AcquireTimeout should be retryable");
    assert!(elapsed >= Duration::from_secs(1), "returned early: {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(1250),
        "overshot the deadline: {elapsed:?}"
    );
    assert_eq!(pool.stats().timeouts, 1);
}

#[test]
fn timeout_change_does_not_extend_inflight_wait() {
    let pool = pool(1, Duration::from_millis(500));
    let _held = pool.acquire().unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || {
            let start = Instant::now();
            let timed_out = matches!(pool.acquire(), Err(Error::AcquireTimeout { .. }));
            (timed_out, start.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(100));
    pool.set_acquire_timeout_secs(30);

    let (timed_out, elapsed) = waiter.join().unwrap();
    assert!(timed_out);
    assert!(
        elapsed < Duration::from_secs(2),
        "deadline should be fixed at call entry, waited {elapsed:?}"
    );
    assert_eq!(pool.acquire_timeout(), Duration::from_secs(30));
}

#[test]
fn raising_capacity_wakes_waiter() {
    let pool = pool(1, Duration::from_secs(5));
    let held = pool.acquire().unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire().map(|g| g.id()))
    };

    thread::sleep(Duration::from_millis(100));
    pool.set_capacity(2);

    let id = waiter
        .join()
        .unwrap()
        .expect("waiter should acquire after capacity increase");
    assert_ne!(id, held.id(), "a new entry should have been created");
    assert_eq!(pool.stats().created, 2);
}

#[test]
fn pool_reuses_after_release() {
    let pool = pool(1, Duration::from_secs(1));

    let id = {
        let r1 = pool.acquire().unwrap();
        r1.id()
    };

    let r2 = pool.acquire().expect("should reuse after drop");
    assert_eq!(r2.id(), id);
    assert_eq!(r2.checkout, 2);

    let stats = pool.stats();
    assert_eq!(stats.acquisitions, 2);
    assert_eq!(stats.created, 1);
}
