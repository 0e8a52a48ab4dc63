use feed_engine_pipeline::errors::ProcessorError;
use feed_engine_pipeline::processor::{Classify, CounterCheck, EventPlan, MergeInstruction, payload};
use feed_engine_shared::types::{AggregateAction, CategoryName, EntityRef, Event, GroupingKey, Milestone};

/// A comment on `extra.review_id`. The review's author is notified unless
/// they wrote the comment themselves.
pub struct CommentPostedClassifier;

impl Classify for CommentPostedClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let author = payload::required_actor(event)?;
        let review = payload::required_uuid(event, "review_id")?;

        let mut plan = EventPlan::new().merge(
            MergeInstruction::new(GroupingKey::new(AggregateAction::CommentPosted, Some(author)))
                .add(CategoryName::Comments, event.entity_id),
        );
        if let Some(review_author) = payload::optional_uuid(event, "review_author_id")? {
            if review_author != author {
                plan = plan.merge(
                    MergeInstruction::new(GroupingKey::new(AggregateAction::CommentReply, Some(review_author)))
                        .add(CategoryName::Comments, event.entity_id),
                );
            }
        }

        let before = payload::optional_i64(event, "comments_before")?;
        let after = payload::optional_i64(event, "comments_after")?;
        if let (Some(old), Some(new)) = (before, after) {
            plan = plan.check_counter(CounterCheck {
                subject: EntityRef::review(review),
                milestone: Milestone::ReviewDiscussed,
                old,
                new,
            });
        }
        Ok(Some(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feed_engine_shared::types::{EntityType, NewEvent};
    use serde_json::json;
    use uuid::Uuid;

    fn comment(author: Uuid, review_author: Uuid) -> Event {
        let new = NewEvent::addition(EntityType::Comment, Uuid::new_v4())
            .with_actor(author)
            .with_extra(json!({
                "review_id": Uuid::new_v4(),
                "review_author_id": review_author,
            }));
        Event::from_new(1, &new, Utc::now())
    }

    #[test]
    fn test_reply_notifies_the_review_author() {
        let (author, review_author) = (Uuid::new_v4(), Uuid::new_v4());
        let plan = CommentPostedClassifier
            .classify(&comment(author, review_author))
            .unwrap()
            .unwrap();
        assert_eq!(plan.merges.len(), 2);
        assert_eq!(plan.merges[1].key.owner_id, Some(review_author));
        assert!(plan.counters.is_empty());
    }

    #[test]
    fn test_own_review_is_not_notified() {
        let author = Uuid::new_v4();
        let plan = CommentPostedClassifier.classify(&comment(author, author)).unwrap().unwrap();
        assert_eq!(plan.merges.len(), 1);
    }
}
