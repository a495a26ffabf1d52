use std::{
    cell::{Cell, OnceCell, RefCell},
    fmt,
    future::{Future, IntoFuture},
    mem::take,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use derive_ex::Ex;
use futures::task::{LocalSpawn, LocalSpawnExt, SpawnError};
use parse_display::Display;
use slabmap::SlabMap;

use crate::{
    rejection::{self, RejectionEvent},
    Error,
};


pub type OperationResult<T> = Result<T, Error>;

/// Result of dispatching an action.
///
/// Middleware that starts asynchronous work returns [`Dispatched::Async`];
/// everything else returns [`Dispatched::Sync`].
#[derive(Debug)]
pub enum Dispatched<T: 'static> {
    Sync(T),
    Async(Operation<T>),
}

impl<T: 'static> Dispatched<T> {
    pub fn is_async(&self) -> bool {
        matches!(self, Dispatched::Async(_))
    }
    pub fn into_sync(self) -> Option<T> {
        match self {
            Dispatched::Sync(value) => Some(value),
            Dispatched::Async(_) => None,
        }
    }
    pub fn into_operation(self) -> Option<Operation<T>> {
        match self {
            Dispatched::Sync(_) => None,
            Dispatched::Async(op) => Some(op),
        }
    }
}
impl<T: 'static> From<Operation<T>> for Dispatched<T> {
    fn from(op: Operation<T>) -> Self {
        Dispatched::Async(op)
    }
}

/// Identity of an [`Operation`], unique within the thread.
#[derive(Debug, Display, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[display("#{0}")]
pub struct OperationId(u64);

impl OperationId {
    fn next() -> Self {
        thread_local! {
            static NEXT_ID: Cell<u64> = const { Cell::new(0) };
        }
        NEXT_ID.with(|id| {
            let value = id.get();
            id.set(value + 1);
            OperationId(value)
        })
    }
}

#[derive(Debug, Display, Clone, Copy, Eq, PartialEq)]
#[display(style = "snake_case")]
pub enum OperationStatus {
    Pending,
    Fulfilled,
    Rejected,
}

/// Operation was dropped before it settled.
#[derive(Display, Debug, Clone, Copy, Eq, PartialEq)]
#[display("operation was dropped before it settled")]
pub struct Canceled;

impl std::error::Error for Canceled {}

/// Shared handle to an asynchronous operation that settles once.
///
/// Attaching a handler with [`on_settled`](Self::on_settled), [`then_with`](Self::then_with)
/// or by awaiting the operation marks its rejection as handled.
/// A rejection with no handler attached is published on the [`rejection`] channel.
#[derive(Ex)]
#[derive_ex(Clone(bound()))]
pub struct Operation<T: 'static>(Rc<OperationNode<T>>);

struct OperationNode<T> {
    id: OperationId,
    outcome: OnceCell<OperationResult<T>>,
    state: RefCell<OperationState<T>>,
}

#[allow(clippy::type_complexity)]
struct OperationState<T> {
    continuations: Vec<Box<dyn FnOnce(&OperationResult<T>)>>,
    wakers: SlabMap<Waker>,
    handled: bool,
    reported: bool,
}

impl<T: 'static> Operation<T> {
    /// Creates a pending operation and the handle used to settle it.
    pub fn new() -> (Self, Settle<T>) {
        let op = Operation(Rc::new(OperationNode {
            id: OperationId::next(),
            outcome: OnceCell::new(),
            state: RefCell::new(OperationState {
                continuations: Vec::new(),
                wakers: SlabMap::new(),
                handled: false,
                reported: false,
            }),
        }));
        let settle = Settle(Some(op.clone()));
        (op, settle)
    }

    pub fn resolved(value: T) -> Self {
        let (op, settle) = Self::new();
        settle.resolve(value);
        op
    }

    /// Creates an operation that has already rejected.
    ///
    /// Like any rejection, it is reported as unhandled until a handler is attached.
    pub fn rejected(error: Error) -> Self {
        let (op, settle) = Self::new();
        settle.reject(error);
        op
    }

    /// Creates an operation settled by `fut`.
    ///
    /// The returned driver must be spawned on an executor.
    /// If the driver is dropped before `fut` completes, the operation rejects with [`Canceled`].
    pub fn from_future(
        fut: impl Future<Output = OperationResult<T>> + 'static,
    ) -> (Self, impl Future<Output = ()> + 'static) {
        let (op, settle) = Self::new();
        (op, async move { settle.settle(fut.await) })
    }

    /// Spawns `fut` on `spawner` and returns the operation it settles.
    pub fn spawn_local(
        spawner: &impl LocalSpawn,
        fut: impl Future<Output = OperationResult<T>> + 'static,
    ) -> Result<Self, SpawnError> {
        let (op, driver) = Self::from_future(fut);
        spawner.spawn_local(driver)?;
        Ok(op)
    }

    pub fn id(&self) -> OperationId {
        self.0.id
    }
    pub fn status(&self) -> OperationStatus {
        match self.0.outcome.get() {
            None => OperationStatus::Pending,
            Some(Ok(_)) => OperationStatus::Fulfilled,
            Some(Err(_)) => OperationStatus::Rejected,
        }
    }
    pub fn is_pending(&self) -> bool {
        self.status() == OperationStatus::Pending
    }
    pub fn is_handled(&self) -> bool {
        self.0.state.borrow().handled
    }

    /// Calls `f` with the outcome once the operation settles.
    ///
    /// If the operation has already settled, `f` is called immediately.
    pub fn on_settled(&self, f: impl FnOnce(&OperationResult<T>) + 'static) {
        self.mark_handled();
        match self.0.outcome.get() {
            Some(outcome) => f(outcome),
            None => self.0.state.borrow_mut().continuations.push(Box::new(f)),
        }
    }

    /// Returns an operation settled with the value returned by `f` once this operation settles.
    pub fn then_with<U: 'static>(
        &self,
        f: impl FnOnce(&OperationResult<T>) -> OperationResult<U> + 'static,
    ) -> Operation<U> {
        let (op, settle) = Operation::new();
        self.on_settled(move |outcome| settle.settle(f(outcome)));
        op
    }

    /// Waits for the operation to settle.
    pub fn wait(&self) -> Wait<T> {
        Wait {
            op: self.clone(),
            key: None,
        }
    }

    fn mark_handled(&self) {
        let reported = {
            let mut s = self.0.state.borrow_mut();
            s.handled = true;
            take(&mut s.reported)
        };
        if reported {
            rejection::notify(&RejectionEvent::Handled { id: self.id() });
        }
    }

    fn complete(&self, outcome: OperationResult<T>) {
        let unhandled = match &outcome {
            Err(e) if !self.0.state.borrow().handled => Some(e.clone()),
            _ => None,
        };
        if self.0.outcome.set(outcome).is_err() {
            panic!("`Operation` {} settled twice.", self.id());
        }
        let (continuations, wakers) = {
            let mut s = self.0.state.borrow_mut();
            s.reported = unhandled.is_some();
            (take(&mut s.continuations), take(&mut s.wakers))
        };
        if let Some(reason) = unhandled {
            rejection::notify(&RejectionEvent::Unhandled {
                id: self.id(),
                reason,
            });
        }
        if let Some(outcome) = self.0.outcome.get() {
            for f in continuations {
                f(outcome);
            }
        }
        for (_, waker) in wakers {
            waker.wake();
        }
    }
}

impl<T: 'static> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

impl<T: Clone + 'static> IntoFuture for Operation<T> {
    type Output = OperationResult<T>;
    type IntoFuture = Wait<T>;
    fn into_future(self) -> Self::IntoFuture {
        Wait {
            op: self,
            key: None,
        }
    }
}

/// Future returned by [`Operation::wait`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Wait<T: 'static> {
    op: Operation<T>,
    key: Option<usize>,
}

impl<T: Clone + 'static> Future for Wait<T> {
    type Output = OperationResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.key.is_none() {
            this.op.mark_handled();
        }
        if let Some(outcome) = this.op.0.outcome.get() {
            return Poll::Ready(outcome.clone());
        }
        let mut s = this.op.0.state.borrow_mut();
        if let Some(key) = this.key {
            s.wakers[key].clone_from(cx.waker());
        } else {
            this.key = Some(s.wakers.insert(cx.waker().clone()));
        }
        Poll::Pending
    }
}
impl<T: 'static> Drop for Wait<T> {
    fn drop(&mut self) {
        if let Some(key) = self.key {
            if self.op.is_pending() {
                self.op.0.state.borrow_mut().wakers.remove(key);
            }
        }
    }
}

/// Settles an [`Operation`] created by [`Operation::new`].
///
/// Dropping it without settling rejects the operation with [`Canceled`].
#[must_use]
pub struct Settle<T: 'static>(Option<Operation<T>>);

impl<T: 'static> Settle<T> {
    pub fn resolve(self, value: T) {
        self.settle(Ok(value))
    }
    pub fn reject(self, error: Error) {
        self.settle(Err(error))
    }
    pub fn settle(mut self, outcome: OperationResult<T>) {
        if let Some(op) = self.0.take() {
            op.complete(outcome);
        }
    }
    pub fn id(&self) -> Option<OperationId> {
        self.0.as_ref().map(|op| op.id())
    }
}
impl<T: 'static> Drop for Settle<T> {
    fn drop(&mut self) {
        if let Some(op) = self.0.take() {
            op.complete(Err(Error::new(Canceled)));
        }
    }
}
