use std::{cell::Ref, rc::Rc};

use derive_ex::Ex;

use crate::{
    ActionInterceptor, DispatchChain, DispatchResult, Error, Middleware, PendingTracker,
    RenderOptions, RenderToString, Store, Subscription,
};


/// Store that tracks asynchronous operations started by its middleware.
///
/// Created by [`RenderEnhancer::apply`] or [`RenderEnhancer::enhance`].
#[derive(Ex)]
#[derive_ex(Clone(bound()))]
pub struct RenderStore<St: Store>(Rc<RenderStoreData<St>>);

struct RenderStoreData<St: Store> {
    store: Rc<St>,
    chain: DispatchChain<St>,
    tracker: Rc<PendingTracker>,
    options: RenderOptions,
}

impl<St: Store> RenderStore<St> {
    pub fn new(store: St, middlewares: Vec<Box<dyn Middleware<St>>>) -> Self {
        Self::with_options(store, middlewares, RenderOptions::default())
    }
    pub fn with_options(
        store: St,
        middlewares: Vec<Box<dyn Middleware<St>>>,
        options: RenderOptions,
    ) -> Self {
        let store = Rc::new(store);
        let tracker = Rc::new(PendingTracker::new());
        let chain = DispatchChain::new(
            store.clone(),
            middlewares,
            &ActionInterceptor::new(tracker.clone()),
        );
        Self(Rc::new(RenderStoreData {
            store,
            chain,
            tracker,
            options,
        }))
    }

    pub fn state(&self) -> Ref<'_, St::State> {
        self.0.store.state()
    }

    /// Dispatches `action` through the middleware chain.
    pub fn dispatch(&self, action: St::Action) -> DispatchResult<St::Output> {
        self.0.chain.dispatch(action)
    }

    pub fn subscribe(&self, listener: Rc<dyn Fn()>) -> Subscription {
        self.0.store.subscribe(listener)
    }

    /// Returns the number of outstanding operations.
    pub fn pending(&self) -> usize {
        self.0.tracker.pending()
    }

    /// Returns the wrapped store.
    pub fn store(&self) -> &Rc<St> {
        &self.0.store
    }
    pub fn options(&self) -> &RenderOptions {
        &self.0.options
    }

    /// Renders `input` until the output is stable and no operation is outstanding.
    ///
    /// `render` runs once immediately and again after every state change.
    /// It receives only `input`; capture a clone of the store to read state or dispatch.
    ///
    /// The future resolves with the output of the last pass.
    /// It fails with [`RenderError::Render`](crate::RenderError::Render) as soon as `render` fails,
    /// and with [`RenderError::Rejected`](crate::RenderError::Rejected)
    /// if an operation failed and its failure was never handled.
    pub fn render_to_string<I, R>(&self, render: R, input: I) -> RenderToString<I, R>
    where
        I: 'static,
        R: FnMut(&I) -> Result<String, Error> + 'static,
    {
        let store = self.0.store.clone();
        RenderToString::start(
            render,
            input,
            self.0.tracker.clone(),
            &self.0.options,
            move |listener| store.subscribe(listener),
        )
    }
}

impl<St: Store> Store for RenderStore<St> {
    type State = St::State;
    type Action = St::Action;
    type Output = St::Output;

    fn state(&self) -> Ref<'_, St::State> {
        RenderStore::state(self)
    }
    fn dispatch(&self, action: St::Action) -> DispatchResult<St::Output> {
        RenderStore::dispatch(self, action)
    }
    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Subscription {
        RenderStore::subscribe(self, listener)
    }
}

/// Creates a [`RenderEnhancer`] with `middlewares`, leftmost outermost.
pub fn render_enhancer<St: Store>(middlewares: Vec<Box<dyn Middleware<St>>>) -> RenderEnhancer<St> {
    RenderEnhancer {
        middlewares,
        options: RenderOptions::default(),
    }
}

/// Builder of [`RenderStore`].
pub struct RenderEnhancer<St: Store> {
    middlewares: Vec<Box<dyn Middleware<St>>>,
    options: RenderOptions,
}

impl<St: Store> RenderEnhancer<St> {
    pub fn options(self, options: RenderOptions) -> Self {
        Self { options, ..self }
    }

    pub fn apply(self, store: St) -> RenderStore<St> {
        RenderStore::with_options(store, self.middlewares, self.options)
    }

    /// Composes with a store factory.
    pub fn enhance<R>(
        self,
        next: impl FnOnce(R, St::State) -> St,
    ) -> impl FnOnce(R, St::State) -> RenderStore<St> {
        move |reducer, initial_state| self.apply(next(reducer, initial_state))
    }
}
