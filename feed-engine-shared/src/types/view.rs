use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::aggregate::{AggregateAction, AggregateId};
use super::category::CategoryName;
use super::fanout::{FeedCursor, FeedSource};
use super::reaction::{ReactionCounts, ReactionKindId};

/// Render-ready slice of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryView {
    pub name: CategoryName,
    /// Hydrated entities, newest first, at most the display cap.
    pub displayed: Vec<serde_json::Value>,
    /// Uncapped count.
    pub total: usize,
    /// Per-group totals for grouped categories.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateView {
    pub aggregate_id: AggregateId,
    pub action: AggregateAction,
    pub owner_id: Option<Uuid>,
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
    pub categories: Vec<CategoryView>,
    pub reaction_counts: ReactionCounts,
    pub my_reactions: Vec<ReactionKindId>,
    pub is_new: bool,
    pub source: FeedSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<AggregateView>,
    pub next_cursor: Option<FeedCursor>,
    pub unread_notifications: i64,
}
