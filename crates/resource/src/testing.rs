//! Testing utilities for pooled resources
//!
//! [`MockFactory`] produces in-memory [`MockConnection`]s and records every
//! create/open/close in a shared [`MockLedger`]. The ledger can inject
//! failures and fire a resource's error/closed notifications, which is how
//! tests drive the pool through its taint and self-close paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::events::{EntryId, EventSink};
use crate::resource::{RawResource, ResourceFactory};

#[derive(Default)]
struct LedgerState {
    created: Vec<EntryId>,
    sinks: HashMap<EntryId, EventSink>,
    close_counts: HashMap<EntryId, u32>,
    self_closed: Vec<EntryId>,
    opens: u64,
    fail_creates: u32,
    fail_opens: u32,
    fail_closes: u32,
    create_delay: Duration,
}

/// Shared record of everything a [`MockFactory`] and its connections did.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    /// Make the next `n` creations fail.
    pub fn fail_next_creates(&self, n: u32) {
        self.state.lock().fail_creates = n;
    }

    /// Make the next `n` `open` calls fail.
    pub fn fail_next_opens(&self, n: u32) {
        self.state.lock().fail_opens = n;
    }

    /// Make the next `n` `close` calls fail (the close is still recorded).
    pub fn fail_next_closes(&self, n: u32) {
        self.state.lock().fail_closes = n;
    }

    /// Sleep this long inside every creation.
    pub fn set_create_delay(&self, delay: Duration) {
        self.state.lock().create_delay = delay;
    }

    /// Ids of every connection created, in creation order.
    pub fn created(&self) -> Vec<EntryId> {
        self.state.lock().created.clone()
    }

    /// Total successful `open` calls.
    pub fn opens(&self) -> u64 {
        self.state.lock().opens
    }

    /// How many times `close` was called on `id`.
    pub fn close_count(&self, id: EntryId) -> u32 {
        self.state.lock().close_counts.get(&id).copied().unwrap_or(0)
    }

    /// Ids that reported their own closure via [`report_closed`](Self::report_closed).
    pub fn self_closed(&self) -> Vec<EntryId> {
        self.state.lock().self_closed.clone()
    }

    /// Created ids that were neither closed by the pool nor closed themselves.
    pub fn unclosed(&self) -> Vec<EntryId> {
        let state = self.state.lock();
        state
            .created
            .iter()
            .copied()
            .filter(|id| !state.close_counts.contains_key(id) && !state.self_closed.contains(id))
            .collect()
    }

    /// Ids the pool closed more than once.
    pub fn closed_twice(&self) -> Vec<EntryId> {
        let state = self.state.lock();
        let mut ids: Vec<_> = state
            .close_counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// The event sink handed to the factory for `id`.
    pub fn sink(&self, id: EntryId) -> Option<EventSink> {
        self.state.lock().sinks.get(&id).cloned()
    }

    /// Fire an error notification for `id`, as a driver would.
    pub fn report_error(&self, id: EntryId) {
        if let Some(sink) = self.sink(id) {
            sink.error();
        }
    }

    /// Mark `id` as closed by its driver and fire the closed notification.
    pub fn report_closed(&self, id: EntryId) {
        let sink = {
            let mut state = self.state.lock();
            state.self_closed.push(id);
            state.sinks.get(&id).cloned()
        };
        if let Some(sink) = sink {
            sink.closed();
        }
    }
}

/// In-memory [`ResourceFactory`] for tests, benches and simulations.
pub struct MockFactory {
    id: String,
    ledger: MockLedger,
}

impl MockFactory {
    /// Create a factory labelled `id` with a fresh ledger.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ledger: MockLedger::default(),
        }
    }

    /// The ledger shared with every connection this factory creates.
    pub fn ledger(&self) -> MockLedger {
        self.ledger.clone()
    }
}

impl ResourceFactory for MockFactory {
    type Raw = MockConnection;

    fn id(&self) -> &str {
        &self.id
    }

    fn create_raw(&self, events: EventSink) -> Result<MockConnection> {
        let delay = {
            let mut state = self.ledger.state.lock();
            if state.fail_creates > 0 {
                state.fail_creates -= 1;
                return Err(Error::creation(&self.id, "injected creation failure"));
            }
            state.create_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let id = events.entry_id();
        let mut state = self.ledger.state.lock();
        state.created.push(id);
        state.sinks.insert(id, events);
        Ok(MockConnection {
            id,
            resource_id: self.id.clone(),
            ledger: self.ledger.clone(),
            checkouts: 0,
        })
    }
}

/// Connection produced by [`MockFactory`].
pub struct MockConnection {
    id: EntryId,
    resource_id: String,
    ledger: MockLedger,
    checkouts: u64,
}

impl MockConnection {
    /// The pool entry this connection belongs to.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// How many times this connection has been opened.
    pub fn checkouts(&self) -> u64 {
        self.checkouts
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("checkouts", &self.checkouts)
            .finish()
    }
}

/// Per-checkout handle of a [`MockConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSession {
    /// The entry this session runs on.
    pub entry: EntryId,
    /// Which checkout of the connection this is (1-based).
    pub checkout: u64,
    /// Free-form counter tests may bump.
    pub queries: u64,
}

impl RawResource for MockConnection {
    type Handle = MockSession;

    fn open(&mut self) -> Result<MockSession> {
        {
            let mut state = self.ledger.state.lock();
            if state.fail_opens > 0 {
                state.fail_opens -= 1;
                return Err(Error::creation(&self.resource_id, "injected open failure"));
            }
            state.opens += 1;
        }
        self.checkouts += 1;
        Ok(MockSession {
            entry: self.id,
            checkout: self.checkouts,
            queries: 0,
        })
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.ledger.state.lock();
        *state.close_counts.entry(self.id).or_insert(0) += 1;
        if state.fail_closes > 0 {
            state.fail_closes -= 1;
            return Err(Error::cleanup(&self.resource_id, "injected close failure"));
        }
        Ok(())
    }
}
