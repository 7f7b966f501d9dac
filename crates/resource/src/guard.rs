//! RAII guard for checked-out resources

use std::fmt;
use std::sync::Arc;

use crate::events::EntryId;
use crate::pool::{Entry, PoolInner};
use crate::resource::{RawResource, ResourceFactory};

/// Handle type a pool over `F` hands out.
pub type Handle<F> = <<F as ResourceFactory>::Raw as RawResource>::Handle;

/// A checked-out resource.
///
/// Dereferences to the per-checkout [`Handle`]. Dropping the guard (or
/// calling [`release`](Self::release)) returns the resource to its pool; use
/// [`detach`](Self::detach) to take the raw resource out of the pool for
/// good.
///
/// A guard can be moved to another thread but never shared: while it is
/// alive its holder is the only owner of the underlying resource.
pub struct Pooled<F: ResourceFactory> {
    pool: Arc<PoolInner<F>>,
    slot: Option<(Entry<F::Raw>, Handle<F>)>,
}

impl<F: ResourceFactory> Pooled<F> {
    pub(crate) fn new(pool: Arc<PoolInner<F>>, entry: Entry<F::Raw>, handle: Handle<F>) -> Self {
        Self {
            pool,
            slot: Some((entry, handle)),
        }
    }

    /// Identity of the underlying pool entry.
    pub fn id(&self) -> EntryId {
        self.slot().0.id
    }

    /// The raw resource behind the handle.
    pub fn raw(&self) -> &F::Raw {
        &self.slot().0.raw
    }

    /// Mutable access to the raw resource behind the handle.
    pub fn raw_mut(&mut self) -> &mut F::Raw {
        &mut self.slot_mut().0.raw
    }

    /// Return the resource to the pool now.
    ///
    /// Same as dropping the guard.
    pub fn release(self) {
        drop(self);
    }

    /// Take the raw resource out of the pool.
    ///
    /// The entry stops counting against capacity and the pool will never
    /// close it; that becomes the caller's job. Error or close notifications
    /// for it are ignored from now on.
    #[must_use]
    pub fn detach(mut self) -> F::Raw {
        let (entry, handle) = self.take_slot();
        drop(handle);
        self.pool.detach(entry.id);
        entry.raw
    }

    fn slot(&self) -> &(Entry<F::Raw>, Handle<F>) {
        self.slot.as_ref().expect("guard used after release")
    }

    fn slot_mut(&mut self) -> &mut (Entry<F::Raw>, Handle<F>) {
        self.slot.as_mut().expect("guard used after release")
    }

    fn take_slot(&mut self) -> (Entry<F::Raw>, Handle<F>) {
        self.slot.take().expect("guard used after release")
    }
}

impl<F: ResourceFactory> std::ops::Deref for Pooled<F> {
    type Target = Handle<F>;

    fn deref(&self) -> &Self::Target {
        &self.slot().1
    }
}

impl<F: ResourceFactory> std::ops::DerefMut for Pooled<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot_mut().1
    }
}

impl<F: ResourceFactory> Drop for Pooled<F> {
    fn drop(&mut self) {
        if let Some((entry, handle)) = self.slot.take() {
            drop(handle);
            self.pool.release(entry, false);
        }
    }
}

impl<F> fmt::Debug for Pooled<F>
where
    F: ResourceFactory,
    Handle<F>: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.slot {
            Some((entry, handle)) => f
                .debug_struct("Pooled")
                .field("id", &entry.id)
                .field("handle", handle)
                .finish(),
            None => f.debug_struct("Pooled").finish_non_exhaustive(),
        }
    }
}
