//! # Feed Engine Shared
//! This crate defines the data structures shared across the feed engine:
//! queued events, aggregates and their categories, fan-out and notification
//! entries, threshold marks, reactions and the read-side views.
pub mod types;
