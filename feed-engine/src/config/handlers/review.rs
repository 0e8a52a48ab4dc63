use feed_engine_pipeline::errors::ProcessorError;
use feed_engine_pipeline::processor::{Classify, EventPlan, MergeInstruction, payload};
use feed_engine_shared::types::{AggregateAction, CategoryName, Event, GroupingKey};

/// A review was posted. Rating-only reviews carry nothing to show.
pub struct ReviewPostedClassifier;

impl Classify for ReviewPostedClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let author = payload::required_actor(event)?;
        if payload::optional_bool(event, "has_text")? == Some(false) {
            return Ok(None);
        }
        let language = payload::optional_str(event, "language")?.map(str::to_string);

        let merge = MergeInstruction::new(GroupingKey::new(AggregateAction::ReviewPosted, Some(author)))
            .add(CategoryName::Reviews, event.entity_id)
            .with_language(language);
        Ok(Some(EventPlan::new().merge(merge)))
    }
}
