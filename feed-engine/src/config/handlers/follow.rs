use feed_engine_pipeline::errors::ProcessorError;
use feed_engine_pipeline::processor::{Classify, CounterCheck, EventPlan, MergeInstruction, Removal, payload};
use feed_engine_shared::types::{
    AggregateAction, CategoryName, EntityRef, Event, GroupingKey, Milestone, ReferenceScope,
};

/// The actor started following `extra.followee_id`.
///
/// Produces the follower's activity, the followee's notification and, when
/// the follower counts are supplied, a popularity check on the followee.
pub struct FollowClassifier;

impl Classify for FollowClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let follower = payload::required_actor(event)?;
        let followee = payload::required_uuid(event, "followee_id")?;
        if follower == followee {
            return Err(ProcessorError::invalid("followee_id", "users cannot follow themselves"));
        }

        let mut plan = EventPlan::new()
            .merge(
                MergeInstruction::new(GroupingKey::new(AggregateAction::UserFollowed, Some(follower)))
                    .add(CategoryName::Users, followee),
            )
            .merge(
                MergeInstruction::new(GroupingKey::new(AggregateAction::NewFollower, Some(followee)))
                    .add(CategoryName::Users, follower),
            );

        let before = payload::optional_i64(event, "followers_before")?;
        let after = payload::optional_i64(event, "followers_after")?;
        if let (Some(old), Some(new)) = (before, after) {
            plan = plan.check_counter(CounterCheck {
                subject: EntityRef::user(followee),
                milestone: Milestone::UserPopular,
                old,
                new,
            });
        }
        Ok(Some(plan))
    }
}

/// The actor unfollowed `extra.followee_id`.
pub struct UnfollowClassifier;

impl Classify for UnfollowClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let follower = payload::required_actor(event)?;
        let followee = payload::required_uuid(event, "followee_id")?;

        Ok(Some(
            EventPlan::new()
                .remove(Removal::scoped(
                    EntityRef::user(followee),
                    ReferenceScope::owned_by(follower, AggregateAction::UserFollowed),
                ))
                .remove(Removal::scoped(
                    EntityRef::user(follower),
                    ReferenceScope::owned_by(followee, AggregateAction::NewFollower),
                )),
        ))
    }
}
