use feed_engine_pipeline::errors::ProcessorError;
use feed_engine_pipeline::processor::{Classify, EventPlan, Removal, payload};
use feed_engine_shared::types::Event;

/// A user account was deleted: references to the user disappear and the
/// user's own aggregates are purged.
pub struct UserDeletedClassifier;

impl Classify for UserDeletedClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        Ok(Some(
            EventPlan::new()
                .remove(Removal::everywhere(event.entity()))
                .purge_owner(event.entity_id),
        ))
    }
}

/// A user switched language; their aggregates are re-tagged.
pub struct UserLanguageClassifier;

impl Classify for UserLanguageClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let language = payload::optional_str(event, "language")?.map(str::to_string);
        Ok(Some(EventPlan::new().relanguage(event.entity_id, language)))
    }
}
