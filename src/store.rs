use std::{
    cell::{Ref, RefCell},
    rc::Rc,
};

use parse_display::Display;
use slabmap::SlabMap;

use crate::{Dispatched, Error, Subscription};


pub type DispatchResult<T> = Result<Dispatched<T>, Error>;

/// State container driven by dispatched actions.
pub trait Store: 'static {
    type State: 'static;
    type Action: 'static;
    type Output: Clone + 'static;

    /// Borrows the current state.
    fn state(&self) -> Ref<'_, Self::State>;

    fn dispatch(&self, action: Self::Action) -> DispatchResult<Self::Output>;

    /// Registers `listener` to be called synchronously after every committed state change.
    ///
    /// Listeners may dispatch; a listener may therefore be called again before it returns.
    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Subscription;
}

/// Reducer-based [`Store`].
///
/// The reducer returns whether it changed the state; listeners are notified only if it did.
/// Dispatching returns the action.
pub struct BasicStore<S: 'static, A: 'static> {
    state: RefCell<S>,
    reducer: RefCell<Box<dyn FnMut(&mut S, &A) -> bool>>,
    listeners: Rc<RefCell<SlabMap<Rc<dyn Fn()>>>>,
}

/// Creates a [`BasicStore`].
pub fn create_store<S, A, R>(reducer: R, initial_state: S) -> BasicStore<S, A>
where
    S: 'static,
    A: 'static,
    R: FnMut(&mut S, &A) -> bool + 'static,
{
    BasicStore {
        state: RefCell::new(initial_state),
        reducer: RefCell::new(Box::new(reducer)),
        listeners: Rc::new(RefCell::new(SlabMap::new())),
    }
}

impl<S: 'static, A: 'static> BasicStore<S, A> {
    fn notify(&self) {
        let listeners: Vec<_> = self.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

impl<S: 'static, A: Clone + 'static> Store for BasicStore<S, A> {
    type State = S;
    type Action = A;
    type Output = A;

    fn state(&self) -> Ref<'_, S> {
        self.state.borrow()
    }

    fn dispatch(&self, action: A) -> DispatchResult<A> {
        let changed = {
            let Ok(mut reducer) = self.reducer.try_borrow_mut() else {
                return Err(Error::new(ReducerBusy));
            };
            let Ok(mut state) = self.state.try_borrow_mut() else {
                return Err(Error::new(StateBorrowed));
            };
            reducer(&mut state, &action)
        };
        if changed {
            self.notify();
        }
        Ok(Dispatched::Sync(action))
    }

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Subscription {
        let key = self.listeners.borrow_mut().insert(listener);
        Subscription::from_slab(&self.listeners, key)
    }
}

/// An action was dispatched from inside the reducer.
#[derive(Display, Debug, Clone, Copy, Eq, PartialEq)]
#[display("reducers may not dispatch actions")]
pub struct ReducerBusy;

impl std::error::Error for ReducerBusy {}

/// An action was dispatched while the state was borrowed.
#[derive(Display, Debug, Clone, Copy, Eq, PartialEq)]
#[display("cannot dispatch while the state is borrowed")]
pub struct StateBorrowed;

impl std::error::Error for StateBorrowed {}
