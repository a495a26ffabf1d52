// #![include_doc("../README.md", start)]
//! # isomut
//!
//! A store enhancer for server-side rendering.
//!
//! Actions dispatched while rendering may start asynchronous work that dispatches more actions.
//! `RenderStore::render_to_string` runs the render function, runs it again after every state
//! change, and resolves once the output is stable and no tracked operation is outstanding.
//!
//! ```rust
//! use futures::executor::LocalPool;
//! use isomut::*;
//!
//! let store = render_enhancer(Vec::new()).apply(create_store(
//!     |count: &mut u32, _: &()| {
//!         *count += 1;
//!         true
//!     },
//!     0,
//! ));
//! let render = {
//!     let store = store.clone();
//!     move |name: &&str| -> Result<String, Error> {
//!         if *store.state() == 0 {
//!             store.dispatch(())?;
//!         }
//!         Ok(format!("<p>{name}: {}</p>", *store.state()))
//!     }
//! };
//! let html = LocalPool::new()
//!     .run_until(store.render_to_string(render, "visits"))
//!     .unwrap();
//! assert_eq!(html, "<p>visits: 1</p>");
//! ```
//!
//! Middleware returns `Dispatched::Async(operation)` for work that finishes later.
//! Every such operation is counted until it settles.
//! If an operation fails and nothing handles the failure, rendering fails with
//! `RenderError::Rejected`.
//!
//! ## License
//!
//! This project is dual licensed under Apache-2.0/MIT.
// #![include_doc("../README.md", end)]
