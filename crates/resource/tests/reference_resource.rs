//! A hand-written factory the way a driver adapter would implement it.
//!
//! The "driver" keeps each connection's `EventSink` and reports failures from
//! its own thread, the way a real socket reader would.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use cistern_resource::error::{Error, Result};
use cistern_resource::events::EventSink;
use cistern_resource::pool::{PoolConfig, ResourcePool};
use cistern_resource::resource::{RawResource, ResourceFactory};

#[derive(Debug, thiserror::Error)]
#[error("handshake rejected by {host}")]
struct HandshakeError {
    host: String,
}

struct LoopbackFactory {
    host: String,
    reject: bool,
    closes: Arc<AtomicU32>,
}

struct LoopbackConn {
    events: EventSink,
    closes: Arc<AtomicU32>,
    statements: u32,
}

#[derive(Debug)]
struct Session {
    statement_no: u32,
}

impl ResourceFactory for LoopbackFactory {
    type Raw = LoopbackConn;

    fn id(&self) -> &str {
        "loopback"
    }

    fn create_raw(&self, events: EventSink) -> Result<LoopbackConn> {
        if self.reject {
            return Err(Error::creation_with_source(
                self.id(),
                HandshakeError {
                    host: self.host.clone(),
                },
            ));
        }
        Ok(LoopbackConn {
            events,
            closes: Arc::clone(&self.closes),
            statements: 0,
        })
    }
}

impl RawResource for LoopbackConn {
    type Handle = Session;

    fn open(&mut self) -> Result<Session> {
        self.statements += 1;
        Ok(Session {
            statement_no: self.statements,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl LoopbackConn {
    /// Simulate the driver's reader thread noticing a broken socket.
    fn break_in_background(&self) {
        let events = self.events.clone();
        std::thread::spawn(move || events.error()).join().unwrap();
    }
}

fn pool(reject: bool) -> (ResourcePool<LoopbackFactory>, Arc<AtomicU32>) {
    let closes = Arc::new(AtomicU32::new(0));
    let factory = LoopbackFactory {
        host: "127.0.0.1:5432".into(),
        reject,
        closes: Arc::clone(&closes),
    };
    let config = PoolConfig::default()
        .with_capacity(2)
        .with_acquire_timeout(Duration::from_millis(200));
    (ResourcePool::new(factory, config), closes)
}

#[test]
fn factory_error_is_surfaced_verbatim() {
    let (pool, _closes) = pool(true);

    let err = pool.acquire().unwrap_err();
    assert!(matches!(err, Error::Creation { .. }), "got {err:?}");
    assert_eq!(err.resource_id(), "loopback");

    let source = std::error::Error::source(&err).expect("driver error should be kept");
    let handshake = source
        .downcast_ref::<HandshakeError>()
        .expect("source should be the driver's own error type");
    assert_eq!(handshake.host, "127.0.0.1:5432");

    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.created, 0);
}

#[test]
fn each_checkout_opens_a_new_session() {
    let (pool, _closes) = pool(false);

    let first = pool.acquire().unwrap();
    assert_eq!(first.statement_no, 1);
    drop(first);

    let second = pool.acquire().unwrap();
    assert_eq!(second.statement_no, 2);
    assert_eq!(second.raw().statements, 2);
}

#[test]
fn driver_thread_error_discards_on_release() {
    let (pool, closes) = pool(false);

    let conn = pool.acquire().unwrap();
    conn.raw().break_in_background();
    assert_eq!(closes.load(Ordering::SeqCst), 0);

    drop(conn);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats().idle, 0);
}
