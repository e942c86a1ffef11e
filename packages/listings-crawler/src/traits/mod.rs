//! Core trait abstractions for the crawler.
//!
//! These traits are the seams to the outside world: the HTTP boundary, the
//! work queue, the output sink and run-state persistence.

pub mod fetcher;
pub mod queue;
pub mod sink;
pub mod store;
