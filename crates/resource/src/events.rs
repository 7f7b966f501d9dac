//! Resource-to-pool notifications.
//!
//! Every resource the pool creates receives an [`EventSink`] bound to its
//! [`EntryId`]. The sink holds only a weak reference to the pool: firing it
//! after the pool is gone is a no-op, and a resource never keeps its pool
//! alive.

use std::fmt;
use std::sync::Weak;

/// Identity of one physical resource under pool ownership.
///
/// Assigned from a per-pool counter, so ids are unique within a pool and
/// increase in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl EntryId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The numeric value of this id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receiver side of resource notifications, implemented by the pool.
pub(crate) trait EventTarget: Send + Sync {
    fn resource_error(&self, id: EntryId);
    fn resource_closed(&self, id: EntryId);
}

/// Handle a resource uses to report its own failure or closure to the pool.
///
/// Cheap to clone and safe to fire from any thread, including a driver's
/// I/O thread.
#[derive(Clone)]
pub struct EventSink {
    id: EntryId,
    target: Weak<dyn EventTarget>,
}

impl EventSink {
    pub(crate) fn new(id: EntryId, target: Weak<dyn EventTarget>) -> Self {
        Self { id, target }
    }

    /// The entry this sink reports for.
    #[must_use]
    pub fn entry_id(&self) -> EntryId {
        self.id
    }

    /// Report that the resource is broken.
    ///
    /// An idle entry is discarded immediately; a checked-out entry is
    /// discarded when its holder releases it instead of being recycled.
    pub fn error(&self) {
        if let Some(target) = self.target.upgrade() {
            target.resource_error(self.id);
        }
    }

    /// Report that the resource closed itself.
    ///
    /// For a checked-out entry this releases its capacity immediately; the
    /// holder's later release drops the resource without closing it again.
    /// Reporting closure twice for the same checkout panics, like any other
    /// double release.
    pub fn closed(&self) {
        if let Some(target) = self.target.upgrade() {
            target.resource_closed(self.id);
        }
    }

    /// Whether the pool this sink reports to still exists.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.target.strong_count() > 0
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(&'static str, EntryId)>>,
    }

    impl EventTarget for Recorder {
        fn resource_error(&self, id: EntryId) {
            self.seen.lock().push(("error", id));
        }

        fn resource_closed(&self, id: EntryId) {
            self.seen.lock().push(("closed", id));
        }
    }

    #[test]
    fn sink_forwards_to_target() {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<Recorder> = Arc::downgrade(&recorder);
        let sink = EventSink::new(EntryId::new(7), weak);

        sink.error();
        sink.clone().closed();

        assert_eq!(
            *recorder.seen.lock(),
            vec![("error", EntryId::new(7)), ("closed", EntryId::new(7))]
        );
    }

    #[test]
    fn sink_is_inert_after_target_dropped() {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<Recorder> = Arc::downgrade(&recorder);
        let sink = EventSink::new(EntryId::new(1), weak);
        drop(recorder);

        assert!(!sink.is_attached());
        sink.error();
        sink.closed();
    }

    #[test]
    fn entry_id_display() {
        assert_eq!(EntryId::new(42).to_string(), "#42");
        assert_eq!(EntryId::new(42).get(), 42);
    }
}
