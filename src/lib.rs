//! A store enhancer for server-side rendering that waits for asynchronous side effects.
//!
//! Actions dispatched while rendering may start asynchronous work that dispatches further actions.
//! [`RenderStore::render_to_string`] renders, re-renders on every state change,
//! and completes once the output is stable and no tracked operation is outstanding.

mod enhancer;
mod error;
mod middleware;
mod operation;
mod options;
pub mod rejection;
mod render;
mod store;
mod subscription;
mod tracker;

#[cfg(doctest)]
mod tests_readme;

pub use enhancer::*;
pub use error::*;
pub use middleware::*;
pub use operation::*;
pub use options::*;
pub use render::*;
pub use store::*;
pub use subscription::*;
pub use tracker::*;
