//! Command dispatch for Stowage.
//!
//! Turns encoded objects into requests, executes them with method-aware retry,
//! splits bulk work into bounded batch requests, and merges responses back
//! into the [`objects::ObjectGraph`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure adapter.** Implements [`objects::HttpTransport`] with
//! `reqwest` and drives it from [`Dispatcher`]. Retry rules, error mapping,
//! and encoding all come from the `objects` crate.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`dispatcher`] | `Dispatcher`: execute, retry loop, batch orchestration |
//! | [`operations`] | save / save_all / fetch / delete / delete_all |
//! | [`transport`] | `ReqwestTransport` |

pub mod dispatcher;
pub mod operations;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use dispatcher::{Dispatcher, BATCH_PATH};
pub use transport::ReqwestTransport;
