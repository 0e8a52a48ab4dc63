use feed_engine_shared::types::{CategoryName, EntityType, Event, GroupingKey, Milestone};

use crate::errors::ProcessorError;
use crate::processor::{Classify, EventPlan, MergeInstruction, payload};

/// Turns a fired milestone into a merge into the community aggregate for
/// that milestone.
///
/// Milestone events are emitted by the threshold detector with
/// `extra.milestone` and `extra.subject_type`; `entity_id` is the subject.
pub struct MilestoneClassifier;

impl Classify for MilestoneClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let milestone: Milestone = payload::required_str(event, "milestone")?.parse()?;
        let subject_type: EntityType = payload::required_str(event, "subject_type")?.parse()?;
        if subject_type != milestone.subject_type() {
            return Err(ProcessorError::invalid(
                "subject_type",
                format!("{milestone} applies to {}", milestone.subject_type()),
            ));
        }
        let category = CategoryName::for_entity_type(subject_type)
            .ok_or_else(|| ProcessorError::invalid("subject_type", "not displayable"))?;

        let key = GroupingKey::new(milestone.community_action(), None);
        Ok(Some(
            EventPlan::new().merge(MergeInstruction::new(key).add(category, event.entity_id)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feed_engine_shared::types::{AggregateAction, NewEvent};
    use serde_json::json;
    use uuid::Uuid;

    fn milestone_event(extra: serde_json::Value) -> Event {
        let new = NewEvent::addition(EntityType::Milestone, Uuid::new_v4()).with_extra(extra);
        Event::from_new(3, &new, Utc::now())
    }

    #[test]
    fn test_merges_subject_into_community_aggregate() {
        let event = milestone_event(json!({"milestone": "game_popular", "subject_type": "game"}));
        let plan = MilestoneClassifier.classify(&event).unwrap().unwrap();

        let merge = &plan.merges[0];
        assert_eq!(merge.key.action, AggregateAction::CommunityGamePopular);
        assert_eq!(merge.key.owner_id, None);
        assert_eq!(merge.additions[0].category, CategoryName::Games);
        assert_eq!(merge.additions[0].id, event.entity_id);
    }

    #[test]
    fn test_rejects_mismatched_subject() {
        let event = milestone_event(json!({"milestone": "review_popular", "subject_type": "user"}));
        assert!(matches!(
            MilestoneClassifier.classify(&event),
            Err(ProcessorError::InvalidField { .. })
        ));

        let event = milestone_event(json!({"milestone": "viral", "subject_type": "user"}));
        assert!(matches!(
            MilestoneClassifier.classify(&event),
            Err(ProcessorError::InvalidValue(_))
        ));
    }
}
