//! Event classification.
//!
//! A [`Classify`] implementation is registered per `(EntityType, EventAction)`
//! in the [`EventProcessor`]. Classifying an event yields an [`EventPlan`]
//! describing every merge, removal and threshold check the event implies, or
//! `None` when the event carries no feed-worthy change.
mod event_processor;
mod milestone;
pub mod payload;
mod plan;

pub use event_processor::EventProcessor;
pub use milestone::MilestoneClassifier;
pub use plan::{CategoryAddition, CounterCheck, EventPlan, LanguageChange, MergeInstruction, Removal};

use feed_engine_shared::types::Event;

use crate::errors::ProcessorError;

/// Decides what one kind of event means for the feeds.
pub trait Classify: Send + Sync {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError>;
}

/// Entry point used by the orchestrator.
pub trait ProcessEvents: Send + Sync {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError>;
}
