//! # Feed Engine Repository
//! This crate provides the storage traits used by the feed engine together
//! with a PostgreSQL implementation and an in-memory implementation for tests
//! and local development.
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod postgres;

pub use errors::RepositoryError;
pub use interfaces::{
    AggregateRepository, EventQueueRepository, EventTransition, FanoutRepository, FeedStore,
    ReactionRepository, ThresholdRepository,
};
pub use memory::MemoryFeedStore;
pub use postgres::PostgresFeedStore;
