//! Domain classifiers, one per entity type and action the feeds care about.
pub mod collection;
pub mod comment;
pub mod follow;
pub mod game;
pub mod removal;
pub mod review;
pub mod review_like;
pub mod user;

pub use collection::{CollectionGameAddedClassifier, CollectionGameRemovedClassifier};
pub use comment::CommentPostedClassifier;
pub use follow::{FollowClassifier, UnfollowClassifier};
pub use game::{GameMarkedClassifier, GameRemovedClassifier};
pub use removal::ReferenceRemovedClassifier;
pub use review::ReviewPostedClassifier;
pub use review_like::ReviewLikedClassifier;
pub use user::{UserDeletedClassifier, UserLanguageClassifier};

use std::sync::Arc;

use feed_engine_pipeline::processor::{EventProcessor, MilestoneClassifier};
use feed_engine_shared::types::{EntityType, EventAction};

use crate::config::Settings;

/// Builds the classifier registry for every event the engine handles.
pub fn register_handlers(settings: &Settings) -> EventProcessor {
    use EntityType::*;
    use EventAction::*;

    let mut processor = EventProcessor::new();
    let removed = Arc::new(ReferenceRemovedClassifier);

    processor.register_classifier(Review, Addition, Arc::new(ReviewPostedClassifier));
    processor.register_classifier(Review, Deletion, removed.clone());
    processor.register_classifier(Comment, Addition, Arc::new(CommentPostedClassifier));
    processor.register_classifier(Comment, Deletion, removed.clone());
    processor.register_classifier(Collection, Deletion, removed);
    processor.register_classifier(Game, Addition, Arc::new(GameMarkedClassifier));
    processor.register_classifier(Game, Deletion, Arc::new(GameRemovedClassifier));
    processor.register_classifier(Follow, Addition, Arc::new(FollowClassifier));
    processor.register_classifier(Follow, Deletion, Arc::new(UnfollowClassifier));
    processor.register_classifier(ReviewLike, Addition, Arc::new(ReviewLikedClassifier));
    processor.register_classifier(
        CollectionGame,
        Addition,
        Arc::new(CollectionGameAddedClassifier::new(settings.collection_min_feed_size)),
    );
    processor.register_classifier(CollectionGame, Deletion, Arc::new(CollectionGameRemovedClassifier));
    processor.register_classifier(User, Deletion, Arc::new(UserDeletedClassifier));
    processor.register_classifier(User, LanguageChange, Arc::new(UserLanguageClassifier));
    processor.register_classifier(Milestone, Addition, Arc::new(MilestoneClassifier));
    processor
}
