//! Document graph traversal.
//!
//! The [`Crawler`] pops documents off the [`Frontier`], fetches them,
//! runs every consumer chain over them and enqueues what the chains
//! discover or forward.

mod content;
pub mod controller;
pub mod forward;
pub mod frontier;

#[cfg(test)]
mod integration_tests;

pub use controller::{Crawler, RunSummary};
pub use forward::forward_document;
pub use frontier::{Frontier, TraversalOrder};
