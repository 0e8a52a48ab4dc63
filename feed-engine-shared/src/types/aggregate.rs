use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::category::{Category, CategoryError, CategoryName};
use super::entity::{EntityRef, EntityType, ParseEnumError};
use super::event::EventId;
use super::reaction::ReactionCounts;

pub type AggregateId = Uuid;

/// Who receives a copy of an aggregate once it is created or updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every follower of the owner, plus the owner's own feed.
    Followers,
    /// The owner alone, through the notification inbox.
    Recipient,
    /// Followers of every entity the aggregate references.
    Community,
}

/// The enumerated kinds of activity an aggregate can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateAction {
    GameStatus,
    ReviewPosted,
    UserFollowed,
    CommentPosted,
    CollectionGameAdded,
    NewFollower,
    CommentReply,
    CommunityGamePopular,
    CommunityUserPopular,
    CommunityReviewPopular,
    CommunityReviewDiscussed,
}

impl AggregateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateAction::GameStatus => "game_status",
            AggregateAction::ReviewPosted => "review_posted",
            AggregateAction::UserFollowed => "user_followed",
            AggregateAction::CommentPosted => "comment_posted",
            AggregateAction::CollectionGameAdded => "collection_game_added",
            AggregateAction::NewFollower => "new_follower",
            AggregateAction::CommentReply => "comment_reply",
            AggregateAction::CommunityGamePopular => "community_game_popular",
            AggregateAction::CommunityUserPopular => "community_user_popular",
            AggregateAction::CommunityReviewPopular => "community_review_popular",
            AggregateAction::CommunityReviewDiscussed => "community_review_discussed",
        }
    }

    pub fn audience(&self) -> Audience {
        match self {
            AggregateAction::GameStatus
            | AggregateAction::ReviewPosted
            | AggregateAction::UserFollowed
            | AggregateAction::CommentPosted
            | AggregateAction::CollectionGameAdded => Audience::Followers,
            AggregateAction::NewFollower | AggregateAction::CommentReply => Audience::Recipient,
            AggregateAction::CommunityGamePopular
            | AggregateAction::CommunityUserPopular
            | AggregateAction::CommunityReviewPopular
            | AggregateAction::CommunityReviewDiscussed => Audience::Community,
        }
    }

    /// The category this action partitions by sub-group key, if any.
    pub fn grouped_category(&self) -> Option<CategoryName> {
        match self {
            AggregateAction::GameStatus => Some(CategoryName::Games),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "game_status" => Ok(AggregateAction::GameStatus),
            "review_posted" => Ok(AggregateAction::ReviewPosted),
            "user_followed" => Ok(AggregateAction::UserFollowed),
            "comment_posted" => Ok(AggregateAction::CommentPosted),
            "collection_game_added" => Ok(AggregateAction::CollectionGameAdded),
            "new_follower" => Ok(AggregateAction::NewFollower),
            "comment_reply" => Ok(AggregateAction::CommentReply),
            "community_game_popular" => Ok(AggregateAction::CommunityGamePopular),
            "community_user_popular" => Ok(AggregateAction::CommunityUserPopular),
            "community_review_popular" => Ok(AggregateAction::CommunityReviewPopular),
            "community_review_discussed" => Ok(AggregateAction::CommunityReviewDiscussed),
            other => Err(ParseEnumError::new("aggregate action", other)),
        }
    }
}

/// Community-wide thresholds. Each fires at most once per subject entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// Many users marked a game owned within a rolling window.
    GamePopular,
    /// A user's follower count crossed the configured threshold.
    UserPopular,
    /// A review's like count crossed the configured threshold.
    ReviewPopular,
    /// A review's comment count crossed the configured threshold.
    ReviewDiscussed,
}

impl Milestone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::GamePopular => "game_popular",
            Milestone::UserPopular => "user_popular",
            Milestone::ReviewPopular => "review_popular",
            Milestone::ReviewDiscussed => "review_discussed",
        }
    }

    pub fn subject_type(&self) -> EntityType {
        match self {
            Milestone::GamePopular => EntityType::Game,
            Milestone::UserPopular => EntityType::User,
            Milestone::ReviewPopular | Milestone::ReviewDiscussed => EntityType::Review,
        }
    }

    pub fn community_action(&self) -> AggregateAction {
        match self {
            Milestone::GamePopular => AggregateAction::CommunityGamePopular,
            Milestone::UserPopular => AggregateAction::CommunityUserPopular,
            Milestone::ReviewPopular => AggregateAction::CommunityReviewPopular,
            Milestone::ReviewDiscussed => AggregateAction::CommunityReviewDiscussed,
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Milestone {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "game_popular" => Ok(Milestone::GamePopular),
            "user_popular" => Ok(Milestone::UserPopular),
            "review_popular" => Ok(Milestone::ReviewPopular),
            "review_discussed" => Ok(Milestone::ReviewDiscussed),
            other => Err(ParseEnumError::new("milestone", other)),
        }
    }
}

/// Decides which aggregate an event merges into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupingKey {
    pub action: AggregateAction,
    pub owner_id: Option<Uuid>,
    pub sub_key: Option<String>,
}

impl GroupingKey {
    pub fn new(action: AggregateAction, owner_id: Option<Uuid>) -> Self {
        Self {
            action,
            owner_id,
            sub_key: None,
        }
    }

    pub fn with_sub_key(mut self, sub_key: impl Into<String>) -> Self {
        self.sub_key = Some(sub_key.into());
        self
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.action)?;
        match self.owner_id {
            Some(owner) => write!(f, "{}", owner)?,
            None => f.write_str("community")?,
        }
        if let Some(sub_key) = &self.sub_key {
            write!(f, ":{}", sub_key)?;
        }
        Ok(())
    }
}

/// Narrows a reverse-index lookup to aggregates of one owner and/or action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceScope {
    pub owner_id: Option<Uuid>,
    pub action: Option<AggregateAction>,
}

impl ReferenceScope {
    pub fn everywhere() -> Self {
        Self::default()
    }

    pub fn owned_by(owner_id: Uuid, action: AggregateAction) -> Self {
        Self {
            owner_id: Some(owner_id),
            action: Some(action),
        }
    }

    pub fn matches(&self, aggregate: &Aggregate) -> bool {
        self.owner_id.is_none_or(|owner| aggregate.owner_id == Some(owner))
            && self.action.is_none_or(|action| aggregate.action == action)
    }
}

/// A deduplicated, displayable activity record merging one or more events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub id: AggregateId,
    pub action: AggregateAction,
    pub owner_id: Option<Uuid>,
    pub grouping_key: String,
    pub generation: i64,
    /// Optimistic concurrency token, bumped on every category write.
    pub version: i64,
    pub language: Option<String>,
    pub categories: BTreeMap<CategoryName, Category>,
    pub reaction_counts: ReactionCounts,
    /// Join row this aggregate exists for, if it is a derived post.
    pub anchor: Option<EntityRef>,
    pub origin_event_id: EventId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Aggregate {
    pub fn new(
        key: &GroupingKey,
        generation: i64,
        origin_event_id: EventId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: key.action,
            owner_id: key.owner_id,
            grouping_key: key.to_string(),
            generation,
            version: 0,
            language: None,
            categories: BTreeMap::new(),
            reaction_counts: ReactionCounts::new(),
            anchor: None,
            origin_event_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends `id` to the named category, creating the category with the
    /// layout this action uses for it.
    pub fn append(
        &mut self,
        name: CategoryName,
        id: Uuid,
        group: Option<&str>,
    ) -> Result<bool, CategoryError> {
        let grouped = self.action.grouped_category() == Some(name);
        self.categories
            .entry(name)
            .or_insert_with(|| if grouped { Category::grouped() } else { Category::flat() })
            .append(id, group)
    }

    pub fn contains(&self, name: CategoryName, id: &Uuid) -> bool {
        self.categories
            .get(&name)
            .is_some_and(|category| category.contains(id))
    }

    /// Strips the entity from every category that can hold its type.
    pub fn remove_entity(&mut self, entity: &EntityRef) -> bool {
        let mut removed = false;
        for (name, category) in self.categories.iter_mut() {
            if name.entity_type() == entity.entity_type {
                removed |= category.remove(&entity.id);
            }
        }
        self.categories.retain(|_, category| !category.is_empty());
        removed
    }

    /// An aggregate with every category empty must not exist.
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(Category::is_empty)
    }

    /// Reverse-index rows for this aggregate.
    pub fn references(&self) -> Vec<(CategoryName, EntityRef)> {
        self.categories
            .iter()
            .flat_map(|(name, category)| {
                category
                    .ids()
                    .iter()
                    .map(move |id| (*name, EntityRef::new(name.entity_type(), *id)))
            })
            .collect()
    }

    /// Every distinct entity referenced by the categories.
    pub fn referenced_entities(&self) -> Vec<EntityRef> {
        let mut entities: Vec<EntityRef> = self.references().into_iter().map(|(_, e)| e).collect();
        entities.sort();
        entities.dedup();
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(action: AggregateAction) -> Aggregate {
        let key = GroupingKey::new(action, Some(Uuid::new_v4()));
        Aggregate::new(&key, 0, 1, Utc::now())
    }

    #[test]
    fn test_grouping_key_string_form() {
        let owner = Uuid::nil();
        let key = GroupingKey::new(AggregateAction::ReviewPosted, Some(owner));
        assert_eq!(key.to_string(), format!("review_posted:{}", owner));

        let key = GroupingKey::new(AggregateAction::CommunityGamePopular, None).with_sub_key("x");
        assert_eq!(key.to_string(), "community_game_popular:community:x");
    }

    #[test]
    fn test_game_status_uses_grouped_games() {
        let mut aggregate = sample(AggregateAction::GameStatus);
        aggregate.append(CategoryName::Games, Uuid::new_v4(), Some("owned")).unwrap();
        assert!(aggregate.categories[&CategoryName::Games].is_grouped());

        let mut aggregate = sample(AggregateAction::CollectionGameAdded);
        aggregate.append(CategoryName::Games, Uuid::new_v4(), None).unwrap();
        assert!(!aggregate.categories[&CategoryName::Games].is_grouped());
    }

    #[test]
    fn test_remove_entity_only_touches_matching_categories() {
        let shared = Uuid::new_v4();
        let mut aggregate = sample(AggregateAction::CollectionGameAdded);
        aggregate.append(CategoryName::Games, shared, None).unwrap();
        aggregate.append(CategoryName::Collections, shared, None).unwrap();

        assert!(aggregate.remove_entity(&EntityRef::game(shared)));
        assert!(!aggregate.categories.contains_key(&CategoryName::Games));
        assert!(aggregate.contains(CategoryName::Collections, &shared));
        assert!(!aggregate.is_empty());
    }

    #[test]
    fn test_references_cover_every_category() {
        let mut aggregate = sample(AggregateAction::CollectionGameAdded);
        let game = Uuid::new_v4();
        let collection = Uuid::new_v4();
        aggregate.append(CategoryName::Games, game, None).unwrap();
        aggregate.append(CategoryName::Collections, collection, None).unwrap();

        let references = aggregate.references();
        assert_eq!(references.len(), 2);
        assert!(references.contains(&(CategoryName::Games, EntityRef::game(game))));
        assert!(references.contains(&(
            CategoryName::Collections,
            EntityRef::new(EntityType::Collection, collection)
        )));
    }

    #[test]
    fn test_reference_scope() {
        let aggregate = sample(AggregateAction::UserFollowed);
        assert!(ReferenceScope::everywhere().matches(&aggregate));
        let owner = aggregate.owner_id.unwrap();
        assert!(ReferenceScope::owned_by(owner, AggregateAction::UserFollowed).matches(&aggregate));
        assert!(!ReferenceScope::owned_by(owner, AggregateAction::NewFollower).matches(&aggregate));
        assert!(!ReferenceScope::owned_by(Uuid::new_v4(), AggregateAction::UserFollowed).matches(&aggregate));
    }

    #[test]
    fn test_milestones_map_to_community_actions() {
        assert_eq!(Milestone::GamePopular.community_action().audience(), Audience::Community);
        assert_eq!(Milestone::ReviewDiscussed.subject_type(), EntityType::Review);
        assert_eq!("user_popular".parse::<Milestone>(), Ok(Milestone::UserPopular));
    }
}
