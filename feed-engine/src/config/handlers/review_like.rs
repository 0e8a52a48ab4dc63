use feed_engine_pipeline::errors::ProcessorError;
use feed_engine_pipeline::processor::{Classify, CounterCheck, EventPlan, payload};
use feed_engine_shared::types::{EntityRef, Event, Milestone};

/// A like on `extra.review_id`. Likes only matter once they make a review
/// popular.
pub struct ReviewLikedClassifier;

impl Classify for ReviewLikedClassifier {
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let review = payload::required_uuid(event, "review_id")?;
        let old = payload::required_i64(event, "likes_before")?;
        let new = payload::required_i64(event, "likes_after")?;

        Ok(Some(EventPlan::new().check_counter(CounterCheck {
            subject: EntityRef::review(review),
            milestone: Milestone::ReviewPopular,
            old,
            new,
        })))
    }
}
