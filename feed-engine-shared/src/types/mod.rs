mod aggregate;
mod category;
mod entity;
mod event;
mod fanout;
mod reaction;
mod threshold;
mod view;

pub use aggregate::{Aggregate, AggregateAction, AggregateId, Audience, GroupingKey, Milestone, ReferenceScope};
pub use category::{Category, CategoryError, CategoryName};
pub use entity::{EntityRef, EntityType, ParseEnumError};
pub use event::{Event, EventAction, EventId, EventOutcome, EventStatus, NewEvent, RetryPolicy};
pub use fanout::{FanoutEntry, FeedCursor, FeedEntry, FeedSource, NotificationEntry};
pub use reaction::{ReactionCounts, ReactionKind, ReactionKindId, ReactionVote};
pub use threshold::{ThresholdMark, ThresholdSample};
pub use view::{AggregateView, CategoryView, FeedPage};
