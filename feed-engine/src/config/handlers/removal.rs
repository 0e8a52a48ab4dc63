use feed_engine_pipeline::errors::ProcessorError;
use feed_engine_pipeline::processor::{Classify, EventPlan, Removal};
use feed_engine_shared::types::Event;

/// The event's entity was deleted or hidden; every aggregate drops it.
///
/// Used for reviews, comments and collections.
pub struct ReferenceRemovedClassifier;

impl Classify for ReferenceRemovedClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        Ok(Some(EventPlan::new().remove(Removal::everywhere(event.entity()))))
    }
}
