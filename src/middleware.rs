use std::{
    cell::{Ref, RefCell},
    rc::{Rc, Weak},
};

use derive_ex::Ex;
use parse_display::Display;
use tracing::debug;

use crate::{DispatchResult, Dispatched, Error, Operation, PendingTracker, Store};


/// Function that handles an action.
pub type Dispatch<A, T> = Rc<dyn Fn(A) -> DispatchResult<T>>;

/// Access to the store given to every [`Middleware`].
#[derive(Ex)]
#[derive_ex(Clone(bound()))]
pub struct MiddlewareApi<St: Store> {
    store: Rc<St>,
    dispatch: Rc<RefCell<Weak<dyn Fn(St::Action) -> DispatchResult<St::Output>>>>,
}

impl<St: Store> MiddlewareApi<St> {
    pub fn state(&self) -> Ref<'_, St::State> {
        self.store.state()
    }

    /// Dispatches `action` through the whole middleware chain.
    pub fn dispatch(&self, action: St::Action) -> DispatchResult<St::Output> {
        let dispatch = self.dispatch.borrow().upgrade();
        match dispatch {
            Some(dispatch) => dispatch(action),
            None => Err(Error::new(StoreDropped)),
        }
    }
}

/// A stage of the dispatch pipeline.
pub trait Middleware<St: Store>: 'static {
    /// Returns the handler for this stage.
    ///
    /// `next` dispatches to the following stage, or to the store itself for the last middleware.
    fn layer(
        &self,
        api: &MiddlewareApi<St>,
        next: Dispatch<St::Action, St::Output>,
    ) -> Dispatch<St::Action, St::Output>;
}

/// Creates a [`Middleware`] from a function called with `(api, next, action)` for each action.
pub fn from_fn<St, F>(f: F) -> Box<dyn Middleware<St>>
where
    St: Store,
    F: Fn(
            &MiddlewareApi<St>,
            &Dispatch<St::Action, St::Output>,
            St::Action,
        ) -> DispatchResult<St::Output>
        + 'static,
{
    Box::new(FnMiddleware(Rc::new(f)))
}

struct FnMiddleware<F>(Rc<F>);

impl<St, F> Middleware<St> for FnMiddleware<F>
where
    St: Store,
    F: Fn(
            &MiddlewareApi<St>,
            &Dispatch<St::Action, St::Output>,
            St::Action,
        ) -> DispatchResult<St::Output>
        + 'static,
{
    fn layer(
        &self,
        api: &MiddlewareApi<St>,
        next: Dispatch<St::Action, St::Output>,
    ) -> Dispatch<St::Action, St::Output> {
        let f = self.0.clone();
        let api = api.clone();
        Rc::new(move |action| f(&api, &next, action))
    }
}

/// Registers asynchronous results of a handler with a [`PendingTracker`].
#[derive(Clone)]
pub struct ActionInterceptor {
    tracker: Rc<PendingTracker>,
}

impl ActionInterceptor {
    pub fn new(tracker: Rc<PendingTracker>) -> Self {
        Self { tracker }
    }

    /// Wraps `handler` so that every operation it returns is tracked.
    pub fn wrap<A: 'static, T: Clone + 'static>(&self, handler: Dispatch<A, T>) -> Dispatch<A, T> {
        let this = self.clone();
        Rc::new(move |action: A| -> DispatchResult<T> { Ok(this.observe(handler(action)?)) })
    }

    /// Tracks `dispatched` if it is asynchronous.
    ///
    /// The returned operation settles with the same outcome after the tracker has been updated,
    /// so callers still observe failures.
    pub fn observe<T: Clone + 'static>(&self, dispatched: Dispatched<T>) -> Dispatched<T> {
        match dispatched {
            Dispatched::Sync(value) => Dispatched::Sync(value),
            Dispatched::Async(op) => Dispatched::Async(self.track(&op)),
        }
    }

    fn track<T: Clone + 'static>(&self, op: &Operation<T>) -> Operation<T> {
        self.tracker.begin();
        let tracker = self.tracker.clone();
        op.then_with(move |outcome| {
            tracker.end(outcome.as_ref().err());
            outcome.clone()
        })
    }
}

/// Middleware composed with the store's own dispatch.
pub struct DispatchChain<St: Store> {
    api: MiddlewareApi<St>,
    dispatch: Dispatch<St::Action, St::Output>,
    len: usize,
}

impl<St: Store> DispatchChain<St> {
    /// Composes `middlewares` right to left around the dispatch of `store`.
    ///
    /// The handler of every middleware is wrapped by `interceptor`.
    pub fn new(
        store: Rc<St>,
        middlewares: Vec<Box<dyn Middleware<St>>>,
        interceptor: &ActionInterceptor,
    ) -> Self {
        let base: Dispatch<St::Action, St::Output> = {
            let store = store.clone();
            Rc::new(move |action| store.dispatch(action))
        };
        let api = MiddlewareApi {
            store,
            dispatch: Rc::new(RefCell::new(Rc::downgrade(&base))),
        };
        let dispatch = middlewares
            .iter()
            .rev()
            .fold(base, |next, m| interceptor.wrap(m.layer(&api, next)));
        *api.dispatch.borrow_mut() = Rc::downgrade(&dispatch);
        debug!(middlewares = middlewares.len(), "dispatch chain composed");
        Self {
            api,
            dispatch,
            len: middlewares.len(),
        }
    }

    pub fn dispatch(&self, action: St::Action) -> DispatchResult<St::Output> {
        (self.dispatch)(action)
    }

    pub fn api(&self) -> &MiddlewareApi<St> {
        &self.api
    }

    /// Returns the number of middlewares in the chain.
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The store behind a [`MiddlewareApi`] was dropped.
#[derive(Display, Debug, Clone, Copy, Eq, PartialEq)]
#[display("the store was dropped")]
pub struct StoreDropped;

impl std::error::Error for StoreDropped {}
