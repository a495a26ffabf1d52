use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use derive_ex::Ex;
use slabmap::SlabMap;
use tracing::trace;

use crate::{Error, Subscription};


/// Receives notifications from a [`PendingTracker`].
pub trait PendingSink: 'static {
    /// A tracked operation failed.
    fn on_failed(self: Rc<Self>, error: &Error);

    /// The number of outstanding operations dropped to zero.
    fn on_drained(self: Rc<Self>);
}

/// Counts outstanding asynchronous operations of a store.
#[derive(Ex)]
#[derive_ex(Default)]
#[default(Self::new())]
pub struct PendingTracker {
    pending: Cell<usize>,
    sinks: Rc<RefCell<SlabMap<Weak<dyn PendingSink>>>>,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self {
            pending: Cell::new(0),
            sinks: Rc::new(RefCell::new(SlabMap::new())),
        }
    }

    /// Returns the number of outstanding operations.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Records the start of an operation.
    pub fn begin(&self) {
        let pending = self
            .pending
            .get()
            .checked_add(1)
            .expect("pending operation count overflow");
        self.pending.set(pending);
        trace!(pending, "operation started");
    }

    /// Records the end of an operation started by [`begin`](Self::begin).
    ///
    /// `error` is forwarded to every sink. Sinks are notified of the drain when the count reaches zero.
    pub fn end(&self, error: Option<&Error>) {
        let pending = self
            .pending
            .get()
            .checked_sub(1)
            .expect("too many calls to `PendingTracker::end`");
        self.pending.set(pending);
        trace!(pending, failed = error.is_some(), "operation finished");

        let sinks = self.sinks();
        if let Some(error) = error {
            for sink in &sinks {
                sink.clone().on_failed(error);
            }
        }
        if pending == 0 {
            for sink in sinks {
                sink.on_drained();
            }
        }
    }

    /// Registers `sink` until the returned subscription is dropped.
    pub fn watch(&self, sink: Weak<dyn PendingSink>) -> Subscription {
        let key = self.sinks.borrow_mut().insert(sink);
        Subscription::from_slab(&self.sinks, key)
    }

    fn sinks(&self) -> Vec<Rc<dyn PendingSink>> {
        self.sinks
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}
