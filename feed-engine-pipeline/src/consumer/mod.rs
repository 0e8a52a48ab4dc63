//! Consumer module for the feed engine pipeline.
//!
//! [`EventQueue`] wraps the queue repository with the retry policy that turns
//! processing outcomes into status transitions. [`EventConsumer`] polls it in a
//! background task and hands batches to the orchestrator.
mod event_consumer;
mod messages;
mod queue;

pub use event_consumer::{ConsumeEvents, EventConsumer};
pub use messages::StreamMessage;
pub use queue::{EventQueue, QueueConfig};
