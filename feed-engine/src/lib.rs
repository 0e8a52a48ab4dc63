//! Feed Engine Library
//!
//! Configuration, dependency wiring and the domain classifiers that turn
//! queued domain events into feed plans.

pub mod config;
pub mod errors;

pub use config::{Dependencies, Settings};
pub use errors::IndexingError;
