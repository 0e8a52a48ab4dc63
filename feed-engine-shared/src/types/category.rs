use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::entity::{EntityType, ParseEnumError};

/// Named slot inside an aggregate. Every name holds ids of exactly one entity
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryName {
    Games,
    Reviews,
    Users,
    Comments,
    Collections,
}

impl CategoryName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryName::Games => "games",
            CategoryName::Reviews => "reviews",
            CategoryName::Users => "users",
            CategoryName::Comments => "comments",
            CategoryName::Collections => "collections",
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            CategoryName::Games => EntityType::Game,
            CategoryName::Reviews => EntityType::Review,
            CategoryName::Users => EntityType::User,
            CategoryName::Comments => EntityType::Comment,
            CategoryName::Collections => EntityType::Collection,
        }
    }

    /// Categories that may hold ids of the given entity type.
    pub fn for_entity_type(entity_type: EntityType) -> Option<CategoryName> {
        match entity_type {
            EntityType::Game => Some(CategoryName::Games),
            EntityType::Review => Some(CategoryName::Reviews),
            EntityType::User => Some(CategoryName::Users),
            EntityType::Comment => Some(CategoryName::Comments),
            EntityType::Collection => Some(CategoryName::Collections),
            _ => None,
        }
    }
}

impl fmt::Display for CategoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryName {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "games" => Ok(CategoryName::Games),
            "reviews" => Ok(CategoryName::Reviews),
            "users" => Ok(CategoryName::Users),
            "comments" => Ok(CategoryName::Comments),
            "collections" => Ok(CategoryName::Collections),
            other => Err(ParseEnumError::new("category", other)),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CategoryError {
    #[error("Category is grouped, a group key is required")]
    MissingGroup,
    #[error("Category is flat, unexpected group key {0}")]
    UnexpectedGroup(String),
}

/// Ordered, deduplicated id storage for one category.
///
/// Insertion order is recency order. A grouped category keeps one list per
/// group key plus a flattened list across all groups, which is what gets
/// displayed and counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Category {
    Flat {
        ids: Vec<Uuid>,
    },
    Grouped {
        groups: BTreeMap<String, Vec<Uuid>>,
        total: Vec<Uuid>,
    },
}

impl Category {
    pub fn flat() -> Self {
        Category::Flat { ids: Vec::new() }
    }

    pub fn grouped() -> Self {
        Category::Grouped {
            groups: BTreeMap::new(),
            total: Vec::new(),
        }
    }

    pub fn is_grouped(&self) -> bool {
        matches!(self, Category::Grouped { .. })
    }

    /// Appends `id` unless already present. Returns whether anything changed.
    pub fn append(&mut self, id: Uuid, group: Option<&str>) -> Result<bool, CategoryError> {
        match self {
            Category::Flat { ids } => {
                if let Some(group) = group {
                    return Err(CategoryError::UnexpectedGroup(group.to_string()));
                }
                Ok(push_unique(ids, id))
            }
            Category::Grouped { groups, total } => {
                let group = group.ok_or(CategoryError::MissingGroup)?;
                let added_to_group = push_unique(groups.entry(group.to_string()).or_default(), id);
                let added_to_total = push_unique(total, id);
                Ok(added_to_group || added_to_total)
            }
        }
    }

    /// Removes `id` everywhere in the category. Groups left empty are dropped.
    pub fn remove(&mut self, id: &Uuid) -> bool {
        match self {
            Category::Flat { ids } => remove_id(ids, id),
            Category::Grouped { groups, total } => {
                let mut removed = remove_id(total, id);
                for ids in groups.values_mut() {
                    removed |= remove_id(ids, id);
                }
                groups.retain(|_, ids| !ids.is_empty());
                removed
            }
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids().contains(id)
    }

    /// Flattened ids in insertion order.
    pub fn ids(&self) -> &[Uuid] {
        match self {
            Category::Flat { ids } => ids,
            Category::Grouped { total, .. } => total,
        }
    }

    pub fn group(&self, key: &str) -> Option<&[Uuid]> {
        match self {
            Category::Flat { .. } => None,
            Category::Grouped { groups, .. } => groups.get(key).map(Vec::as_slice),
        }
    }

    /// Per-group sizes; empty for flat categories.
    pub fn group_totals(&self) -> BTreeMap<String, usize> {
        match self {
            Category::Flat { .. } => BTreeMap::new(),
            Category::Grouped { groups, .. } => groups
                .iter()
                .map(|(key, ids)| (key.clone(), ids.len()))
                .collect(),
        }
    }

    /// Uncapped number of ids, used for "N more" rendering.
    pub fn total(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// The most recent `cap` ids, newest first.
    pub fn displayed(&self, cap: usize) -> Vec<Uuid> {
        self.ids().iter().rev().take(cap).copied().collect()
    }
}

fn push_unique(ids: &mut Vec<Uuid>, id: Uuid) -> bool {
    if ids.contains(&id) {
        return false;
    }
    ids.push(id);
    true
}

fn remove_id(ids: &mut Vec<Uuid>, id: &Uuid) -> bool {
    let before = ids.len();
    ids.retain(|existing| existing != id);
    ids.len() != before
}
