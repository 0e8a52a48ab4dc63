use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when a stored enum label does not match any known variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self { kind, value: value.into() }
    }
}

/// The kinds of domain entities that can emit events or appear inside an
/// aggregate category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Game,
    Review,
    Comment,
    Collection,
    /// Join row linking a game to a collection.
    CollectionGame,
    Follow,
    ReviewLike,
    /// Community milestone emitted by the threshold detector.
    Milestone,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Game => "game",
            EntityType::Review => "review",
            EntityType::Comment => "comment",
            EntityType::Collection => "collection",
            EntityType::CollectionGame => "collection_game",
            EntityType::Follow => "follow",
            EntityType::ReviewLike => "review_like",
            EntityType::Milestone => "milestone",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityType::User),
            "game" => Ok(EntityType::Game),
            "review" => Ok(EntityType::Review),
            "comment" => Ok(EntityType::Comment),
            "collection" => Ok(EntityType::Collection),
            "collection_game" => Ok(EntityType::CollectionGame),
            "follow" => Ok(EntityType::Follow),
            "review_like" => Ok(EntityType::ReviewLike),
            "milestone" => Ok(EntityType::Milestone),
            other => Err(ParseEnumError::new("entity type", other)),
        }
    }
}

/// A typed pointer to a domain entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: Uuid,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: Uuid) -> Self {
        Self { entity_type, id }
    }

    pub fn user(id: Uuid) -> Self {
        Self::new(EntityType::User, id)
    }

    pub fn game(id: Uuid) -> Self {
        Self::new(EntityType::Game, id)
    }

    pub fn review(id: Uuid) -> Self {
        Self::new(EntityType::Review, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}
