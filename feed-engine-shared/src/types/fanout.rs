use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregate::AggregateId;

/// A copy of an aggregate in one follower's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutEntry {
    pub id: Uuid,
    pub aggregate_id: AggregateId,
    pub follower_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub is_new: bool,
    pub hidden: bool,
}

/// A copy of an aggregate in one recipient's notification inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub id: Uuid,
    pub aggregate_id: AggregateId,
    pub recipient_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub is_new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    Feed,
    Notification,
}

/// One row of the merged feed/notification listing, before hydration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub aggregate_id: AggregateId,
    pub created_at: DateTime<Utc>,
    pub is_new: bool,
    pub source: FeedSource,
}

impl FeedEntry {
    pub fn cursor(&self) -> FeedCursor {
        FeedCursor {
            created_at: self.created_at,
            aggregate_id: self.aggregate_id,
        }
    }
}

/// Keyset pagination position. Entries strictly older than the cursor come
/// next; ties on `created_at` break on `aggregate_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedCursor {
    pub created_at: DateTime<Utc>,
    pub aggregate_id: AggregateId,
}

impl FeedCursor {
    pub fn is_before(&self, created_at: DateTime<Utc>, aggregate_id: AggregateId) -> bool {
        (created_at, aggregate_id) < (self.created_at, self.aggregate_id)
    }
}
