use std::{error::Error as StdError, fmt, rc::Rc};

use parse_display::Display;


/// Error shared between an asynchronous operation and everything that observes it.
///
/// Cloning is cheap; all clones refer to the same underlying error.
#[derive(Clone)]
pub struct Error(Rc<dyn StdError + 'static>);

impl Error {
    pub fn new(error: impl StdError + 'static) -> Self {
        Self(Rc::new(error))
    }

    /// Creates an error from a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(Message(message.to_string()))
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref()
    }

    /// Returns `true` if both values are clones of the same error.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}
impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

#[derive(Display, Debug)]
#[display("{0}")]
struct Message(String);

impl StdError for Message {}

/// Reason a [`RenderStore::render_to_string`](crate::RenderStore::render_to_string) call failed.
#[derive(Display, Debug, Clone)]
pub enum RenderError {
    /// The render function failed.
    #[display("render failed: {0}")]
    Render(Error),

    /// An asynchronous operation rejected and nothing handled the rejection.
    #[display("unhandled rejection: {0}")]
    Rejected(Error),

    /// The output kept changing after the configured number of passes.
    #[display("render did not stabilize within {0} passes")]
    Unstable(usize),
}

impl RenderError {
    pub fn error(&self) -> Option<&Error> {
        match self {
            RenderError::Render(e) | RenderError::Rejected(e) => Some(e),
            RenderError::Unstable(_) => None,
        }
    }
}

impl StdError for RenderError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error().map(|e| e as &(dyn StdError + 'static))
    }
}
