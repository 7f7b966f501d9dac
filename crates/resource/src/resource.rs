//! Factory and raw-resource contracts
//!
//! The pool never inspects a resource's protocol. It asks a
//! [`ResourceFactory`] for a new [`RawResource`] when it has headroom and no
//! idle entry, calls [`RawResource::open`] on every checkout and
//! [`RawResource::close`] exactly once when the entry is discarded.

use crate::error::Result;
use crate::events::EventSink;

/// Produces physical resources for a [`ResourcePool`](crate::ResourcePool).
///
/// `create_raw` may be slow (network handshake, authentication); the pool
/// calls it without holding its lock, so other callers keep acquiring and
/// releasing while a creation is in flight.
pub trait ResourceFactory: Send + Sync + 'static {
    /// The physical resource type produced by this factory.
    type Raw: RawResource;

    /// Label for this kind of resource (e.g. "postgres"), used in errors and logs.
    fn id(&self) -> &str;

    /// Create a new physical resource.
    ///
    /// `events` is the resource's line back into the pool. Keep it with the
    /// resource (or its driver) and call [`EventSink::error`] or
    /// [`EventSink::closed`] when the resource fails or closes out-of-band.
    /// Notifications fired before this method returns are ignored.
    fn create_raw(&self, events: EventSink) -> Result<Self::Raw>;
}

/// A physical resource owned by the pool while idle and by exactly one
/// caller while checked out.
pub trait RawResource: Send + 'static {
    /// Per-checkout handle given to the caller (a logical session, a cursor,
    /// or `()` when the raw resource is used directly).
    type Handle: Send + 'static;

    /// Prepare the resource for a new caller.
    ///
    /// A failure discards the entry and is returned from `acquire`.
    fn open(&mut self) -> Result<Self::Handle>;

    /// Physically close the resource. Called at most once per resource and
    /// never for a resource that reported its own closure.
    ///
    /// Errors are logged by the pool and otherwise ignored.
    fn close(&mut self) -> Result<()>;
}
