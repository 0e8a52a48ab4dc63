use feed_engine_pipeline::errors::ProcessorError;
use feed_engine_pipeline::processor::{Classify, EventPlan, MergeInstruction, Removal, payload};
use feed_engine_shared::types::{
    AggregateAction, CategoryName, EntityRef, Event, GroupingKey, Milestone, ReferenceScope,
    ThresholdSample,
};

/// Status that counts towards a game becoming popular.
const OWNED_STATUS: &str = "owned";

/// A user marked a game with a status (owned, playing, beaten, ...).
pub struct GameMarkedClassifier;

impl Classify for GameMarkedClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let user = payload::required_actor(event)?;
        let status = payload::required_str(event, "status")?;
        if status.trim().is_empty() {
            return Err(ProcessorError::invalid("status", "empty"));
        }

        let mut plan = EventPlan::new().merge(
            MergeInstruction::new(GroupingKey::new(AggregateAction::GameStatus, Some(user)))
                .add_grouped(CategoryName::Games, event.entity_id, status),
        );
        if status == OWNED_STATUS {
            plan = plan.sample(ThresholdSample {
                entity: EntityRef::game(event.entity_id),
                milestone: Milestone::GamePopular,
                actor_id: user,
                occurred_at: event.occurred_at,
            });
        }
        Ok(Some(plan))
    }
}

/// A user unmarked a game, or the game itself went away when there is no
/// actor.
pub struct GameRemovedClassifier;

impl Classify for GameRemovedClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let game = EntityRef::game(event.entity_id);
        let removal = match event.actor_id {
            Some(user) => Removal::scoped(game, ReferenceScope::owned_by(user, AggregateAction::GameStatus)),
            None => Removal::everywhere(game),
        };
        Ok(Some(EventPlan::new().remove(removal)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feed_engine_shared::types::{EntityType, NewEvent};
    use serde_json::json;
    use uuid::Uuid;

    fn marked(status: &str) -> Event {
        let new = NewEvent::addition(EntityType::Game, Uuid::new_v4())
            .with_actor(Uuid::new_v4())
            .with_extra(json!({ "status": status }));
        Event::from_new(1, &new, Utc::now())
    }

    #[test]
    fn test_owned_game_is_sampled_for_popularity() {
        let plan = GameMarkedClassifier.classify(&marked("owned")).unwrap().unwrap();
        assert_eq!(plan.merges[0].additions[0].group.as_deref(), Some("owned"));
        assert_eq!(plan.samples.len(), 1);
        assert_eq!(plan.samples[0].milestone, Milestone::GamePopular);

        let plan = GameMarkedClassifier.classify(&marked("playing")).unwrap().unwrap();
        assert!(plan.samples.is_empty());
    }

    #[test]
    fn test_missing_status_is_malformed() {
        let new = NewEvent::addition(EntityType::Game, Uuid::new_v4()).with_actor(Uuid::new_v4());
        let event = Event::from_new(1, &new, Utc::now());
        assert!(GameMarkedClassifier.classify(&event).is_err());
    }

    #[test]
    fn test_unmark_is_scoped_to_the_actor() {
        let user = Uuid::new_v4();
        let new = NewEvent::deletion(EntityType::Game, Uuid::new_v4()).with_actor(user);
        let plan = GameRemovedClassifier
            .classify(&Event::from_new(1, &new, Utc::now()))
            .unwrap()
            .unwrap();
        assert_eq!(plan.removals[0].scope, ReferenceScope::owned_by(user, AggregateAction::GameStatus));

        let hidden = NewEvent::deletion(EntityType::Game, Uuid::new_v4());
        let plan = GameRemovedClassifier
            .classify(&Event::from_new(2, &hidden, Utc::now()))
            .unwrap()
            .unwrap();
        assert_eq!(plan.removals[0].scope, ReferenceScope::everywhere());
    }
}
