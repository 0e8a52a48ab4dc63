//! This module defines and re-exports the storage interfaces of the feed
//! engine. Each trait covers one family of tables; `FeedStore` is the union
//! a single backend provides.
mod aggregates;
mod events;
mod fanout;
mod reactions;
mod thresholds;

pub use aggregates::AggregateRepository;
pub use events::{EventQueueRepository, EventTransition};
pub use fanout::FanoutRepository;
pub use reactions::ReactionRepository;
pub use thresholds::ThresholdRepository;

/// A backend implementing every feed engine repository.
pub trait FeedStore:
    EventQueueRepository + AggregateRepository + FanoutRepository + ThresholdRepository + ReactionRepository
{
}

impl<T> FeedStore for T where
    T: EventQueueRepository
        + AggregateRepository
        + FanoutRepository
        + ThresholdRepository
        + ReactionRepository
{
}
