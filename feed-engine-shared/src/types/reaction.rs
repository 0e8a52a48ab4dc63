use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::aggregate::AggregateId;

pub type ReactionKindId = i32;

/// Vote totals per reaction kind, as stored on the aggregate.
pub type ReactionCounts = BTreeMap<ReactionKindId, i64>;

/// An entry of the reaction catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionKind {
    pub id: ReactionKindId,
    pub label: String,
    pub is_positive: bool,
    pub sort_order: i32,
}

/// One user's reaction of one kind on one aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionVote {
    pub id: Uuid,
    pub aggregate_id: AggregateId,
    pub voter_id: Uuid,
    pub reaction_kind_id: ReactionKindId,
    pub created_at: DateTime<Utc>,
}
