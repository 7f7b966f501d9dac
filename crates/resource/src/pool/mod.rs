//! Bounded, blocking resource pool over a [`ResourceFactory`].
//!
//! All bookkeeping (idle list, active count, tainted set, capacity, closed
//! flag) lives in one [`PoolState`] behind one mutex, paired with a condition
//! variable that blocked acquirers wait on. Factory calls and physical closes
//! always run with the lock released, so a resource may report events from
//! inside `open`/`close` without deadlocking the pool.
//!
//! Per-entry lifecycle: `idle ⇄ active → discarded`, with `idle → discarded`
//! on taint or shutdown. An active entry that reports an error is remembered
//! in the tainted set and discarded on release instead of recycled.

pub mod config;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::events::{EntryId, EventSink, EventTarget};
use crate::guard::Pooled;
use crate::resource::{RawResource, ResourceFactory};

pub use config::PoolConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entries and bookkeeping
// ---------------------------------------------------------------------------

/// A physical resource under pool ownership.
pub(crate) struct Entry<R> {
    pub(crate) id: EntryId,
    pub(crate) raw: R,
    created_at: Instant,
}

/// Bookkeeping for a checked-out entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lease {
    /// Held by a caller and counted in `active`.
    Held,
    /// The resource reported its own closure while held; its capacity has
    /// already been returned and the holder's release only drops it.
    ClosedByResource,
}

/// Why an entry left the pool for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiscardReason {
    /// The resource reported an error.
    Tainted,
    /// `open` failed on checkout.
    OpenFailed,
    /// The resource closed itself; it must not be closed again.
    ClosedByResource,
    /// Released while the pool was over its (lowered) capacity.
    OverCapacity,
    /// The pool is closed.
    Shutdown,
}

impl DiscardReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Tainted => "tainted",
            Self::OpenFailed => "open_failed",
            Self::ClosedByResource => "closed_by_resource",
            Self::OverCapacity => "over_capacity",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Bookkeeping a checkout has taken on but not yet handed to a guard.
#[derive(Debug, Clone, Copy)]
enum Reserved {
    /// One unit of `pending`, held while the factory runs.
    Pending,
    /// A fresh lease, held while `open` runs.
    Lease(EntryId),
}

/// Gives back a [`Reserved`] unit if the factory or `open` unwinds.
///
/// On the normal path the caller [`disarm`](Self::disarm)s it and settles the
/// bookkeeping itself.
struct Rollback<'a, F: ResourceFactory> {
    inner: &'a PoolInner<F>,
    reserved: Option<Reserved>,
}

impl<'a, F: ResourceFactory> Rollback<'a, F> {
    fn new(inner: &'a PoolInner<F>, reserved: Reserved) -> Self {
        Self {
            inner,
            reserved: Some(reserved),
        }
    }

    fn disarm(mut self) {
        self.reserved = None;
    }
}

impl<F: ResourceFactory> Drop for Rollback<'_, F> {
    fn drop(&mut self) {
        let Some(reserved) = self.reserved.take() else {
            return;
        };
        let mut state = self.inner.state.lock();
        match reserved {
            Reserved::Pending => state.pending -= 1,
            Reserved::Lease(id) => {
                // The raw resource unwinds with the panic and is never closed.
                if state.leases.remove(&id) == Some(Lease::Held) {
                    state.return_capacity(id);
                }
                state.tainted.remove(&id);
                state.discarded += 1;
            }
        }
        drop(state);
        self.inner.available.notify_all();
        tracing::warn!(
            resource = self.inner.resource_id(),
            ?reserved,
            "checkout unwound; reservation returned"
        );
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolStats {
    /// Current number of entries checked out.
    pub active: usize,
    /// Current number of idle entries.
    pub idle: usize,
    /// Creations currently in flight.
    pub pending: usize,
    /// Current capacity.
    pub capacity: usize,
    /// Total entries ever created.
    pub created: u64,
    /// Total entries discarded.
    pub discarded: u64,
    /// Total successful acquisitions.
    pub acquisitions: u64,
    /// Total releases (including resource-initiated ones).
    pub releases: u64,
    /// Total acquire calls that timed out.
    pub timeouts: u64,
    /// Whether the pool has been closed.
    pub closed: bool,
}

/// State guarded by the pool mutex.
struct PoolState<R> {
    /// LIFO: the most recently released entry is reused first.
    idle: Vec<Entry<R>>,
    active: usize,
    pending: usize,
    leases: HashMap<EntryId, Lease>,
    /// Checked-out entries that reported an error.
    tainted: HashSet<EntryId>,
    capacity: usize,
    acquire_timeout: Duration,
    closed: bool,
    created: u64,
    discarded: u64,
    acquisitions: u64,
    releases: u64,
    timeouts: u64,
}

impl<R> PoolState<R> {
    fn new(config: &PoolConfig) -> Self {
        Self {
            idle: Vec::with_capacity(config.capacity),
            active: 0,
            pending: 0,
            leases: HashMap::with_capacity(config.capacity),
            tainted: HashSet::new(),
            capacity: config.capacity,
            acquire_timeout: config.acquire_timeout,
            closed: false,
            created: 0,
            discarded: 0,
            acquisitions: 0,
            releases: 0,
            timeouts: 0,
        }
    }

    fn has_headroom(&self) -> bool {
        self.active + self.pending < self.capacity
    }

    /// Record a new checkout of `id`.
    fn lease(&mut self, id: EntryId) {
        self.active += 1;
        self.acquisitions += 1;
        let previous = self.leases.insert(id, Lease::Held);
        assert!(
            previous.is_none(),
            "invariant violation: entry {id} checked out twice"
        );
    }

    /// Give back the capacity held by a checkout.
    fn return_capacity(&mut self, id: EntryId) {
        assert!(
            self.active > 0,
            "invariant violation: active count underflow releasing entry {id}"
        );
        self.active -= 1;
        self.releases += 1;
    }

    fn take_idle(&mut self, id: EntryId) -> Option<Entry<R>> {
        let pos = self.idle.iter().position(|entry| entry.id == id)?;
        Some(self.idle.remove(pos))
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.active,
            idle: self.idle.len(),
            pending: self.pending,
            capacity: self.capacity,
            created: self.created,
            discarded: self.discarded,
            acquisitions: self.acquisitions,
            releases: self.releases,
            timeouts: self.timeouts,
            closed: self.closed,
        }
    }
}

/// Inner shared state for the pool.
pub(crate) struct PoolInner<F: ResourceFactory> {
    factory: F,
    state: Mutex<PoolState<F::Raw>>,
    /// Signalled whenever headroom may have changed.
    available: Condvar,
    next_id: AtomicU64,
    poll_interval: Duration,
}

impl<F: ResourceFactory> PoolInner<F> {
    fn resource_id(&self) -> &str {
        self.factory.id()
    }

    /// Return a checked-out entry.
    ///
    /// `broken` forces a discard (used when `open` failed).
    pub(crate) fn release(&self, entry: Entry<F::Raw>, broken: bool) {
        let mut state = self.state.lock();
        let lease = state.leases.remove(&entry.id);
        let verdict = match lease {
            None => panic!(
                "invariant violation: entry {} of '{}' released but not checked out",
                entry.id,
                self.resource_id()
            ),
            Some(Lease::ClosedByResource) => {
                state.tainted.remove(&entry.id);
                Some(DiscardReason::ClosedByResource)
            }
            Some(Lease::Held) => {
                state.return_capacity(entry.id);
                let tainted = state.tainted.remove(&entry.id);
                if broken {
                    Some(DiscardReason::OpenFailed)
                } else if tainted {
                    Some(DiscardReason::Tainted)
                } else if state.closed {
                    Some(DiscardReason::Shutdown)
                } else if state.active + state.pending + state.idle.len() >= state.capacity {
                    Some(DiscardReason::OverCapacity)
                } else {
                    None
                }
            }
        };

        let discard = match verdict {
            None => {
                tracing::debug!(resource = self.resource_id(), entry = %entry.id, "entry recycled");
                state.idle.push(entry);
                None
            }
            Some(reason) => {
                state.discarded += 1;
                Some((entry, reason))
            }
        };
        drop(state);
        self.available.notify_all();

        if let Some((entry, reason)) = discard {
            self.discard(entry, reason);
        }
    }

    /// Remove a checked-out entry from bookkeeping without recycling it.
    pub(crate) fn detach(&self, id: EntryId) {
        let mut state = self.state.lock();
        match state.leases.remove(&id) {
            None => panic!(
                "invariant violation: entry {id} of '{}' detached but not checked out",
                self.resource_id()
            ),
            Some(Lease::ClosedByResource) => {}
            Some(Lease::Held) => state.return_capacity(id),
        }
        state.tainted.remove(&id);
        drop(state);
        self.available.notify_all();
        tracing::debug!(resource = self.resource_id(), entry = %id, "entry detached from pool");
    }

    /// Physically close an entry that has already left the bookkeeping.
    fn discard(&self, mut entry: Entry<F::Raw>, reason: DiscardReason) {
        tracing::debug!(
            resource = self.resource_id(),
            entry = %entry.id,
            reason = reason.as_str(),
            age_ms = entry.created_at.elapsed().as_millis() as u64,
            "discarding entry"
        );
        if reason == DiscardReason::ClosedByResource {
            return;
        }
        if let Err(error) = entry.raw.close() {
            tracing::warn!(
                resource = self.resource_id(),
                entry = %entry.id,
                %error,
                "failed to close discarded entry"
            );
        }
    }

    fn discard_all(&self, entries: Vec<Entry<F::Raw>>, reason: DiscardReason) {
        for entry in entries {
            self.discard(entry, reason);
        }
    }
}

impl<F: ResourceFactory> EventTarget for PoolInner<F> {
    fn resource_error(&self, id: EntryId) {
        let mut state = self.state.lock();
        if state.leases.get(&id) == Some(&Lease::Held) {
            state.tainted.insert(id);
            tracing::debug!(resource = self.resource_id(), entry = %id, "checked-out entry tainted");
            return;
        }
        match state.take_idle(id) {
            Some(entry) => {
                state.discarded += 1;
                drop(state);
                self.available.notify_all();
                self.discard(entry, DiscardReason::Tainted);
            }
            None => {
                tracing::debug!(resource = self.resource_id(), entry = %id, "error for unknown entry ignored");
            }
        }
    }

    fn resource_closed(&self, id: EntryId) {
        let mut state = self.state.lock();
        match state.leases.get(&id).copied() {
            Some(Lease::Held) => {
                state.leases.insert(id, Lease::ClosedByResource);
                state.tainted.remove(&id);
                state.return_capacity(id);
                drop(state);
                self.available.notify_all();
                tracing::debug!(resource = self.resource_id(), entry = %id, "checked-out entry closed by resource");
            }
            Some(Lease::ClosedByResource) => panic!(
                "invariant violation: entry {id} of '{}' reported closed twice for one checkout",
                self.resource_id()
            ),
            None => match state.take_idle(id) {
                Some(entry) => {
                    state.discarded += 1;
                    drop(state);
                    self.available.notify_all();
                    self.discard(entry, DiscardReason::ClosedByResource);
                }
                None => {
                    tracing::debug!(resource = self.resource_id(), entry = %id, "close for unknown entry ignored");
                }
            },
        }
    }
}

impl<F: ResourceFactory> Drop for PoolInner<F> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let idle = std::mem::take(&mut state.idle);
        if idle.is_empty() {
            return;
        }
        state.discarded += idle.len() as u64;
        self.discard_all(idle, DiscardReason::Shutdown);
    }
}

// ---------------------------------------------------------------------------
// ResourcePool<F>
// ---------------------------------------------------------------------------

/// Bounded, thread-safe pool of resources produced by `F`.
///
/// At most `capacity` resources are checked out at once. `acquire` hands out
/// the most recently released idle resource, creates a new one when there is
/// headroom and nothing idle, and otherwise blocks until capacity frees up or
/// the acquire timeout elapses.
///
/// Cloning is cheap; clones share the same pool.
pub struct ResourcePool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Clone for ResourcePool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for ResourcePool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("resource_id", &self.inner.resource_id())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F: ResourceFactory> ResourcePool<F> {
    /// Create a new pool, rejecting out-of-range settings.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if [`PoolConfig::validate`] fails.
    pub fn try_new(factory: F, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(factory, config))
    }

    /// Create a new pool over `factory`.
    ///
    /// Out-of-range settings in `config` are reset to their defaults (see
    /// [`PoolConfig::normalized`]). No resource is created up front.
    pub fn new(factory: F, config: PoolConfig) -> Self {
        let config = config.normalized();
        Self {
            inner: Arc::new(PoolInner {
                factory,
                state: Mutex::new(PoolState::new(&config)),
                available: Condvar::new(),
                next_id: AtomicU64::new(1),
                poll_interval: config.poll_interval,
            }),
        }
    }

    /// The factory backing this pool.
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Acquire a resource, blocking until one is available.
    ///
    /// The deadline is fixed when the call starts, from the acquire timeout
    /// in effect at that moment; later changes to the timeout do not affect
    /// an in-flight wait. There is no fairness between waiters.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolClosed`] if the pool is (or becomes) closed
    /// - [`Error::AcquireTimeout`] if no capacity frees up in time
    /// - whatever the factory or [`RawResource::open`] returned; such a
    ///   failure is not retried and does not consume capacity
    pub fn acquire(&self) -> Result<Pooled<F>> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let timeout = state.acquire_timeout;
        // `None` when the timeout is too large to represent: no deadline.
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if state.closed {
                return Err(Error::pool_closed(inner.resource_id()));
            }

            if state.has_headroom() {
                if let Some(entry) = state.idle.pop() {
                    state.lease(entry.id);
                    drop(state);
                    tracing::debug!(resource = inner.resource_id(), entry = %entry.id, "reusing idle entry");
                    return self.checkout(entry);
                }
                state.pending += 1;
                drop(state);
                return self.create();
            }

            let now = Instant::now();
            let slice = match deadline {
                Some(deadline) if now >= deadline => {
                    state.timeouts += 1;
                    let active = state.active;
                    drop(state);
                    tracing::debug!(
                        resource = inner.resource_id(),
                        timeout_ms = timeout.as_millis() as u64,
                        active,
                        "acquire timed out"
                    );
                    return Err(Error::acquire_timeout(inner.resource_id(), timeout));
                }
                Some(deadline) => inner.poll_interval.min(deadline - now),
                None => inner.poll_interval,
            };
            inner.available.wait_for(&mut state, slice);
        }
    }

    /// Return a resource to the pool.
    ///
    /// Equivalent to dropping the guard. Tainted resources, resources
    /// released after `close`, and resources above a lowered capacity are
    /// discarded instead of recycled.
    pub fn release(&self, pooled: Pooled<F>) {
        pooled.release();
    }

    /// Change the capacity for future acquisitions.
    ///
    /// Zero resets to the default. Lowering the capacity never revokes
    /// checked-out resources; the pool shrinks as they are released.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = config::normalize_capacity(capacity);
        self.inner.state.lock().capacity = capacity;
        self.inner.available.notify_all();
        tracing::debug!(resource = self.inner.resource_id(), capacity, "pool capacity changed");
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.inner.state.lock().capacity
    }

    /// Change the acquire timeout, in whole seconds. Zero resets to the default.
    ///
    /// Only acquire calls that start afterwards see the new value.
    pub fn set_acquire_timeout_secs(&self, secs: u64) {
        self.set_acquire_timeout(Duration::from_secs(secs));
    }

    /// Change the acquire timeout. Zero resets to the default.
    pub fn set_acquire_timeout(&self, timeout: Duration) {
        self.inner.state.lock().acquire_timeout = config::normalize_timeout(timeout);
    }

    /// Current acquire timeout.
    pub fn acquire_timeout(&self) -> Duration {
        self.inner.state.lock().acquire_timeout
    }

    /// Close the pool.
    ///
    /// Idle resources are closed before this returns. Checked-out resources
    /// are closed when their holders release them. Waiting and future
    /// `acquire` calls fail with [`Error::PoolClosed`]. Calling `close` again
    /// does nothing.
    pub fn close(&self) {
        let inner = &self.inner;
        let idle = {
            let mut state = inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.discarded += idle.len() as u64;
            tracing::info!(
                resource = inner.resource_id(),
                idle = idle.len(),
                active = state.active,
                "closing resource pool"
            );
            idle
        };
        inner.available.notify_all();
        inner.discard_all(idle, DiscardReason::Shutdown);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Ids of the idle entries, least recently released first.
    pub fn idle_ids(&self) -> Vec<EntryId> {
        self.inner.state.lock().idle.iter().map(|entry| entry.id).collect()
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.state.lock().stats()
    }

    /// Create a new entry. One unit of headroom is already reserved in
    /// `pending`.
    fn create(&self) -> Result<Pooled<F>> {
        let inner = &self.inner;
        let id = EntryId::new(inner.next_id.fetch_add(1, Ordering::Relaxed));
        let weak = Arc::downgrade(inner);
        let target: Weak<dyn EventTarget> = weak;
        let rollback = Rollback::new(inner, Reserved::Pending);
        let created = inner.factory.create_raw(EventSink::new(id, target));
        rollback.disarm();

        let mut state = inner.state.lock();
        state.pending -= 1;
        let raw = match created {
            Ok(raw) => raw,
            Err(error) => {
                drop(state);
                inner.available.notify_all();
                tracing::warn!(resource = inner.resource_id(), %error, "resource creation failed");
                return Err(error);
            }
        };
        state.created += 1;
        let entry = Entry {
            id,
            raw,
            created_at: Instant::now(),
        };

        if state.closed {
            state.discarded += 1;
            drop(state);
            inner.available.notify_all();
            inner.discard(entry, DiscardReason::Shutdown);
            return Err(Error::pool_closed(inner.resource_id()));
        }

        state.lease(id);
        drop(state);
        tracing::debug!(resource = inner.resource_id(), entry = %id, "created new entry");
        self.checkout(entry)
    }

    /// Open a leased entry for its new holder.
    fn checkout(&self, mut entry: Entry<F::Raw>) -> Result<Pooled<F>> {
        let rollback = Rollback::new(&self.inner, Reserved::Lease(entry.id));
        let opened = entry.raw.open();
        rollback.disarm();
        match opened {
            Ok(handle) => Ok(Pooled::new(Arc::clone(&self.inner), entry, handle)),
            Err(error) => {
                tracing::warn!(
                    resource = self.inner.resource_id(),
                    entry = %entry.id,
                    %error,
                    "failed to open entry"
                );
                self.inner.release(entry, true);
                Err(error)
            }
        }
    }
}
