//! Thread-wide notifications about rejected [`Operation`](crate::Operation)s.
//!
//! An operation that rejects while no handler is attached publishes [`RejectionEvent::Unhandled`].
//! If a handler is attached to it afterwards, [`RejectionEvent::Handled`] follows.
//! Every render session observes this channel through its own [`RejectionReconciler`].

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use slabmap::SlabMap;

use crate::{Error, OperationId};

#[cfg(test)]
mod tests;

thread_local! {
    static LISTENERS: RefCell<SlabMap<Rc<dyn Fn(&RejectionEvent)>>> = RefCell::new(SlabMap::new());
}

#[derive(Debug, Clone)]
pub enum RejectionEvent {
    /// The operation rejected with no handler attached.
    Unhandled { id: OperationId, reason: Error },
    /// A handler was attached to an operation previously reported as unhandled.
    Handled { id: OperationId },
}

impl RejectionEvent {
    pub fn id(&self) -> OperationId {
        match self {
            RejectionEvent::Unhandled { id, .. } | RejectionEvent::Handled { id } => *id,
        }
    }
}

/// Registers `f` to be called for every rejection event on this thread.
///
/// The registration is released when the returned hook is dropped or [`removed`](RejectionHook::remove).
pub fn on_rejection(f: impl Fn(&RejectionEvent) + 'static) -> RejectionHook {
    let key = LISTENERS.with(|l| l.borrow_mut().insert(Rc::new(f)));
    RejectionHook { key: Some(key) }
}

pub(crate) fn notify(event: &RejectionEvent) {
    let listeners: Vec<_> = LISTENERS.with(|l| l.borrow().values().cloned().collect());
    for listener in listeners {
        listener(event);
    }
}

/// Registration created by [`on_rejection`].
#[must_use]
#[derive(Debug)]
pub struct RejectionHook {
    key: Option<usize>,
}

impl RejectionHook {
    pub fn is_active(&self) -> bool {
        self.key.is_some()
    }

    /// Stops receiving events.
    ///
    /// Calling this more than once has no effect.
    pub fn remove(&mut self) {
        if let Some(key) = self.key.take() {
            let _ = LISTENERS.try_with(|l| l.borrow_mut().remove(key));
        }
    }
}
impl Drop for RejectionHook {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Tracks operations that rejected without a handler while installed.
///
/// Entries are added on [`RejectionEvent::Unhandled`] and removed on [`RejectionEvent::Handled`].
#[derive(Debug)]
pub struct RejectionReconciler {
    unhandled: Rc<RefCell<BTreeMap<OperationId, Error>>>,
    hook: RejectionHook,
}

impl RejectionReconciler {
    pub fn install() -> Self {
        let unhandled = Rc::new(RefCell::new(BTreeMap::new()));
        let hook = on_rejection({
            let unhandled = unhandled.clone();
            move |event| match event {
                RejectionEvent::Unhandled { id, reason } => {
                    unhandled.borrow_mut().insert(*id, reason.clone());
                }
                RejectionEvent::Handled { id } => {
                    unhandled.borrow_mut().remove(id);
                }
            }
        });
        Self { unhandled, hook }
    }

    pub fn is_observing(&self) -> bool {
        self.hook.is_active()
    }

    /// Stops observing; the collected set is kept.
    pub fn release(&mut self) {
        self.hook.remove();
    }

    /// Returns `true` if every rejection observed so far has been handled.
    pub fn is_clean(&self) -> bool {
        self.unhandled.borrow().is_empty()
    }

    pub fn unhandled(&self) -> Vec<(OperationId, Error)> {
        self.unhandled
            .borrow()
            .iter()
            .map(|(id, reason)| (*id, reason.clone()))
            .collect()
    }

    /// Decides the outcome of a session whose first captured failure is `first_error`.
    ///
    /// Releases the hooks. Fails only if a failure was captured and some rejection is still unhandled.
    pub fn reconcile(&mut self, first_error: Option<Error>) -> Result<(), Error> {
        self.release();
        match first_error {
            Some(e) if !self.is_clean() => Err(e),
            _ => Ok(()),
        }
    }
}
