use std::{
    cell::{Cell, RefCell},
    future::Future,
    mem::{replace, take},
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll, Waker},
};

use parse_display::Display;
use tracing::{debug, trace, warn};

use crate::{
    rejection::RejectionReconciler, Error, PendingSink, PendingTracker, RenderError,
    RenderOptions, Subscription,
};


#[derive(Debug, Display, Clone, Copy, Eq, PartialEq)]
#[display(style = "snake_case")]
pub enum Phase {
    /// No render pass is running.
    Idle,
    /// A render pass is running; invalidations are queued.
    Rendering,
    /// The session has completed; invalidations are ignored.
    Settled,
}

/// State machine deciding when the render function runs.
///
/// | phase       | `invalidate`                        | `begin_pass`                      |
/// |-------------|-------------------------------------|-----------------------------------|
/// | `Idle`      | dirty, `Rendering`, returns `true`  | returns `false`                   |
/// | `Rendering` | dirty, returns `false`              | dirty: clean, count pass, `true`; clean: `Idle`, `false` |
/// | `Settled`   | returns `false`                     | returns `false`                   |
#[derive(Debug)]
pub struct RenderLoop {
    phase: Phase,
    dirty: bool,
    passes: usize,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            dirty: false,
            passes: 0,
        }
    }
    pub fn phase(&self) -> Phase {
        self.phase
    }
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the number of passes started so far.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Marks the output as stale.
    ///
    /// Returns `true` if the caller must run passes with [`begin_pass`](Self::begin_pass).
    pub fn invalidate(&mut self) -> bool {
        match self.phase {
            Phase::Settled => false,
            Phase::Rendering => {
                self.dirty = true;
                false
            }
            Phase::Idle => {
                self.dirty = true;
                self.phase = Phase::Rendering;
                true
            }
        }
    }

    /// Starts the next pass if the output is stale.
    pub fn begin_pass(&mut self) -> bool {
        if self.phase != Phase::Rendering {
            return false;
        }
        if self.dirty {
            self.dirty = false;
            self.passes += 1;
            true
        } else {
            self.phase = Phase::Idle;
            false
        }
    }

    /// Enters the terminal phase.
    ///
    /// Returns `false` if the loop had already settled.
    pub fn settle(&mut self) -> bool {
        self.dirty = false;
        replace(&mut self.phase, Phase::Settled) != Phase::Settled
    }
}
impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

struct Session<I, R> {
    input: I,
    render: RefCell<R>,
    state: RefCell<RenderLoop>,
    html: RefCell<String>,
    first_error: RefCell<Option<Error>>,
    fatal: RefCell<Option<RenderError>>,
    waker: RefCell<Option<Waker>>,
    tracker: Rc<PendingTracker>,
    completed: Cell<bool>,
    max_passes: Option<usize>,
}

impl<I, R> Session<I, R>
where
    I: 'static,
    R: FnMut(&I) -> Result<String, Error> + 'static,
{
    fn render(&self) -> Result<(), RenderError> {
        if !self.state.borrow_mut().invalidate() {
            return Ok(());
        }
        loop {
            let pass = {
                let mut state = self.state.borrow_mut();
                state.begin_pass().then(|| state.passes())
            };
            let Some(pass) = pass else {
                self.complete();
                return Ok(());
            };
            if let Some(max_passes) = self.max_passes {
                if pass > max_passes {
                    self.state.borrow_mut().settle();
                    return Err(RenderError::Unstable(max_passes));
                }
            }
            trace!(pass, "render pass");
            let result = {
                let mut render = self.render.borrow_mut();
                (*render)(&self.input)
            };
            match result {
                Ok(html) => *self.html.borrow_mut() = html,
                Err(e) => {
                    self.state.borrow_mut().settle();
                    return Err(RenderError::Render(e));
                }
            }
        }
    }

    /// Settles the loop once no operation is outstanding.
    ///
    /// While a pass is running, completion is left to the end of that pass.
    fn complete(&self) {
        if self.state.borrow().phase() == Phase::Rendering || !self.tracker.is_idle() {
            return;
        }
        if self.state.borrow_mut().settle() {
            self.completed.set(true);
            debug!(passes = self.state.borrow().passes(), "render settled");
            self.wake();
        }
    }

    fn on_state_changed(&self) {
        if let Err(e) = self.render() {
            self.fail(e);
        }
    }

    fn fail(&self, e: RenderError) {
        warn!(error = %e, "render session failed");
        self.fatal.borrow_mut().get_or_insert(e);
        self.wake();
    }

    fn wake(&self) {
        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
    }
}

impl<I, R> PendingSink for Session<I, R>
where
    I: 'static,
    R: FnMut(&I) -> Result<String, Error> + 'static,
{
    fn on_failed(self: Rc<Self>, error: &Error) {
        if self.completed.get() {
            return;
        }
        let mut first_error = self.first_error.borrow_mut();
        if first_error.is_none() {
            debug!(%error, "operation failed during render");
            *first_error = Some(error.clone());
        }
    }
    fn on_drained(self: Rc<Self>) {
        self.complete();
    }
}

/// Future returned by [`RenderStore::render_to_string`](crate::RenderStore::render_to_string).
///
/// The first render pass runs when the future is created.
/// Dropping the future ends the session and releases its hooks and subscriptions.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct RenderToString<I: 'static, R: 'static>(RawRenderToString<I, R>);

enum RawRenderToString<I: 'static, R: 'static> {
    Running(Running<I, R>),
    Failed(RenderError),
    Done,
}

struct Running<I: 'static, R: 'static> {
    session: Rc<Session<I, R>>,
    reconciler: RejectionReconciler,
    settle_ticks: usize,
    deferred: Option<usize>,
    _subscription: Subscription,
    _watch: Subscription,
}

impl<I, R> RenderToString<I, R>
where
    I: 'static,
    R: FnMut(&I) -> Result<String, Error> + 'static,
{
    /// Starts a session and runs the first render pass.
    ///
    /// `subscribe` registers a listener for state changes of the store.
    pub fn start(
        render: R,
        input: I,
        tracker: Rc<PendingTracker>,
        options: &RenderOptions,
        subscribe: impl FnOnce(Rc<dyn Fn()>) -> Subscription,
    ) -> Self {
        let reconciler = RejectionReconciler::install();
        let session = Rc::new(Session {
            input,
            render: RefCell::new(render),
            state: RefCell::new(RenderLoop::new()),
            html: RefCell::new(String::new()),
            first_error: RefCell::new(None),
            fatal: RefCell::new(None),
            waker: RefCell::new(None),
            tracker: tracker.clone(),
            completed: Cell::new(false),
            max_passes: options.max_passes,
        });
        let subscription = subscribe(Rc::new({
            let session = Rc::downgrade(&session);
            move || {
                if let Some(session) = session.upgrade() {
                    session.on_state_changed();
                }
            }
        }));
        let sink: Weak<dyn PendingSink> = Rc::downgrade(&session) as Weak<dyn PendingSink>;
        let watch = tracker.watch(sink);
        debug!(pending = tracker.pending(), "render session started");

        if let Err(e) = session.render() {
            warn!(error = %e, "initial render failed");
            return Self(RawRenderToString::Failed(e));
        }
        Self(RawRenderToString::Running(Running {
            session,
            reconciler,
            settle_ticks: options.settle_ticks,
            deferred: None,
            _subscription: subscription,
            _watch: watch,
        }))
    }

    /// Returns the phase of the render loop, or `None` once the future has completed.
    pub fn phase(&self) -> Option<Phase> {
        match &self.0 {
            RawRenderToString::Running(r) => Some(r.session.state.borrow().phase()),
            RawRenderToString::Failed(_) => Some(Phase::Settled),
            RawRenderToString::Done => None,
        }
    }

    /// Returns the number of render passes so far, or `None` once the future has completed.
    pub fn passes(&self) -> Option<usize> {
        match &self.0 {
            RawRenderToString::Running(r) => Some(r.session.state.borrow().passes()),
            _ => None,
        }
    }
}

impl<I, R> Future for RenderToString<I, R>
where
    I: 'static,
    R: FnMut(&I) -> Result<String, Error> + 'static,
{
    type Output = Result<String, RenderError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match replace(&mut this.0, RawRenderToString::Done) {
            RawRenderToString::Running(mut running) => match running.poll_settle(cx) {
                Poll::Ready(result) => Poll::Ready(result),
                Poll::Pending => {
                    this.0 = RawRenderToString::Running(running);
                    Poll::Pending
                }
            },
            RawRenderToString::Failed(e) => Poll::Ready(Err(e)),
            RawRenderToString::Done => panic!("`RenderToString` polled after completion"),
        }
    }
}

impl<I, R> Running<I, R>
where
    I: 'static,
    R: FnMut(&I) -> Result<String, Error> + 'static,
{
    fn poll_settle(&mut self, cx: &mut Context<'_>) -> Poll<Result<String, RenderError>> {
        let session = &self.session;
        if let Some(e) = session.fatal.borrow_mut().take() {
            return Poll::Ready(Err(e));
        }
        if self.deferred.is_none() {
            if !session.completed.get() {
                *session.waker.borrow_mut() = Some(cx.waker().clone());
                return Poll::Pending;
            }
            if session.first_error.borrow().is_none() {
                self.reconciler.release();
                return Poll::Ready(Ok(take(&mut *session.html.borrow_mut())));
            }
            debug!("waiting for failures to be handled");
            self.deferred = Some(self.settle_ticks);
        }
        if let Some(ticks) = &mut self.deferred {
            if *ticks > 0 {
                *ticks -= 1;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
        }
        let first_error = session.first_error.borrow().clone();
        match self.reconciler.reconcile(first_error) {
            Ok(()) => {
                debug!("failures were handled");
                Poll::Ready(Ok(take(&mut *session.html.borrow_mut())))
            }
            Err(e) => {
                warn!(error = %e, "render rejected by an unhandled failure");
                Poll::Ready(Err(RenderError::Rejected(e)))
            }
        }
    }
}
