//! Shutdown closes idle entries now and checked-out entries on release.

use std::thread;
use std::time::{Duration, Instant};

use cistern_resource::error::Error;
use cistern_resource::pool::{PoolConfig, ResourcePool};
use cistern_resource::testing::{MockFactory, MockLedger};

fn pool(capacity: usize, timeout: Duration) -> (ResourcePool<MockFactory>, MockLedger) {
    let factory = MockFactory::new("tracked");
    let ledger = factory.ledger();
    let config = PoolConfig::default()
        .with_capacity(capacity)
        .with_acquire_timeout(timeout);
    (ResourcePool::new(factory, config), ledger)
}

/// Close discards the idle entry at once; the held entry is closed only
/// when its holder releases it, and acquire fails afterwards.
#[test]
fn close_discards_idle_then_active_on_release() {
    let (pool, ledger) = pool(2, Duration::from_secs(1));

    let g1 = pool.acquire().unwrap();
    let g2 = pool.acquire().unwrap();
    let (idle_id, active_id) = (g1.id(), g2.id());
    drop(g1);

    let stats = pool.stats();
    assert_eq!(stats.idle, 1, "one entry should be idle");
    assert_eq!(stats.active, 1, "one entry should be active");

    pool.close();

    assert!(pool.is_closed());
    assert_eq!(ledger.close_count(idle_id), 1, "idle entry closed synchronously");
    assert_eq!(ledger.close_count(active_id), 0, "held entry must not be revoked");
    assert_eq!(pool.stats().idle, 0);

    drop(g2);
    assert_eq!(ledger.close_count(active_id), 1);
    assert_eq!(
        pool.stats().idle,
        0,
        "entry released after close should NOT go to idle"
    );

    let err = pool.acquire().unwrap_err();
    assert!(matches!(err, Error::PoolClosed { .. }), "got {err:?}");
    assert!(!err.is_retryable());
}

#[test]
fn close_is_idempotent() {
    let (pool, ledger) = pool(2, Duration::from_secs(1));
    let id = pool.acquire().unwrap().id();

    pool.close();
    pool.close();

    assert_eq!(ledger.close_count(id), 1);
    assert!(ledger.closed_twice().is_empty());
    assert_eq!(pool.stats().discarded, 1);
}

#[test]
fn close_empty_pool_is_noop() {
    let (pool, ledger) = pool(2, Duration::from_secs(1));
    pool.close();

    let stats = pool.stats();
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.discarded, 0);
    assert!(stats.closed);
    assert!(ledger.created().is_empty());
}

/// New acquire calls after close fail immediately (not after timeout).
#[test]
fn acquire_after_close_fails_immediately() {
    let (pool, _ledger) = pool(1, Duration::from_secs(10));
    pool.close();

    let start = Instant::now();
    let err = pool.acquire().unwrap_err();
    assert!(matches!(err, Error::PoolClosed { .. }));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn close_wakes_blocked_waiters() {
    let (pool, _ledger) = pool(1, Duration::from_secs(10));
    let held = pool.acquire().unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let closed = matches!(pool.acquire(), Err(Error::PoolClosed { .. }));
                (closed, start.elapsed())
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(100));
    pool.close();

    for waiter in waiters {
        let (closed, elapsed) = waiter.join().unwrap();
        assert!(closed, "waiter should observe PoolClosed");
        assert!(elapsed < Duration::from_secs(2), "waiter hung for {elapsed:?}");
    }
    drop(held);
}

/// A creation that completes after close is discarded, not handed out.
#[test]
fn creation_racing_close_is_discarded() {
    let (pool, ledger) = pool(1, Duration::from_secs(1));
    ledger.set_create_delay(Duration::from_millis(300));

    let creator = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire().map(|g| g.id()))
    };

    thread::sleep(Duration::from_millis(100));
    pool.close();

    let err = creator.join().unwrap().unwrap_err();
    assert!(matches!(err, Error::PoolClosed { .. }), "got {err:?}");

    let created = ledger.created();
    assert_eq!(created.len(), 1);
    assert_eq!(ledger.close_count(created[0]), 1);
    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.pending, 0);
}
