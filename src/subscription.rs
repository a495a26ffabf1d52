use std::{
    cell::RefCell,
    mem::take,
    rc::{Rc, Weak},
};

use slabmap::SlabMap;


/// Registration that is released when dropped.
///
/// Returned by [`Store::subscribe`](crate::Store::subscribe) and [`PendingTracker::watch`](crate::PendingTracker::watch).
#[derive(Default)]
#[must_use]
pub struct Subscription(RawSubscription);

impl Subscription {
    pub fn empty() -> Self {
        Subscription(RawSubscription::Empty)
    }
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Subscription(RawSubscription::Fn(Box::new(f)))
    }

    /// Creates a subscription that removes `key` from `entries` when dropped.
    ///
    /// Does nothing if `entries` has already been dropped.
    pub fn from_slab<T: 'static>(entries: &Rc<RefCell<SlabMap<T>>>, key: usize) -> Self {
        let entries = Rc::downgrade(entries);
        let entries: Weak<dyn Unsubscribe> = entries;
        Subscription(RawSubscription::Slab { entries, key })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.0, RawSubscription::Empty)
    }

    /// Releases the registration now.
    pub fn unsubscribe(self) {}
}
impl Drop for Subscription {
    fn drop(&mut self) {
        match take(&mut self.0) {
            RawSubscription::Empty => {}
            RawSubscription::Fn(f) => f(),
            RawSubscription::Slab { entries, key } => {
                if let Some(entries) = entries.upgrade() {
                    entries.unsubscribe(key);
                }
            }
        }
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce() + 'static>),
    Slab {
        entries: Weak<dyn Unsubscribe>,
        key: usize,
    },
}

trait Unsubscribe {
    fn unsubscribe(&self, key: usize);
}
impl<T> Unsubscribe for RefCell<SlabMap<T>> {
    fn unsubscribe(&self, key: usize) {
        let removed = self.borrow_mut().remove(key);
        drop(removed);
    }
}
