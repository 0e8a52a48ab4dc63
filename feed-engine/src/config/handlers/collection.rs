use feed_engine_pipeline::errors::ProcessorError;
use feed_engine_pipeline::processor::{Classify, EventPlan, MergeInstruction, payload};
use feed_engine_shared::types::{AggregateAction, CategoryName, Event, GroupingKey};

/// A game was added to a collection. `entity_id` is the join row.
///
/// Small collections stay out of the feed. Each join row gets an aggregate of
/// its own so removing the game later deletes exactly that post.
pub struct CollectionGameAddedClassifier {
    min_feed_size: i64,
}

impl CollectionGameAddedClassifier {
    pub fn new(min_feed_size: i64) -> Self {
        Self { min_feed_size }
    }
}

impl Classify for CollectionGameAddedClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let owner = payload::required_actor(event)?;
        let collection = payload::required_uuid(event, "collection_id")?;
        let game = payload::required_uuid(event, "game_id")?;
        let size = payload::required_i64(event, "collection_size")?;
        if size < self.min_feed_size {
            return Ok(None);
        }

        let merge = MergeInstruction::new(
            GroupingKey::new(AggregateAction::CollectionGameAdded, Some(owner)).with_sub_key(collection.to_string()),
        )
        .add(CategoryName::Games, game)
        .add(CategoryName::Collections, collection)
        .starting_new()
        .anchored_on(event.entity());
        Ok(Some(EventPlan::new().merge(merge)))
    }
}

/// A game left a collection: the post derived from that join row goes away.
pub struct CollectionGameRemovedClassifier;

impl Classify for CollectionGameRemovedClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        Ok(Some(EventPlan::new().delete_anchored(event.entity())))
    }
}
