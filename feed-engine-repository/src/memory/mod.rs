//! In-memory implementation of every feed repository, for tests and local
//! development (`STORAGE_BACKEND=memory`).
//!
//! All tables live behind one lock so that multi-table writes (a threshold
//! mark plus its event, an aggregate delete plus its cascades) are atomic,
//! matching the transactional PostgreSQL behaviour.
mod aggregates;
mod events;
mod fanout;
mod reactions;
mod thresholds;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use feed_engine_shared::types::{
    Aggregate, AggregateId, EntityRef, Event, EventId, FanoutEntry, Milestone, NotificationEntry,
    ReactionKind, ReactionKindId, ReactionVote, ThresholdMark,
};
use uuid::Uuid;

use crate::errors::RepositoryError;

#[derive(Default)]
struct MemoryState {
    next_event_id: EventId,
    events: BTreeMap<EventId, Event>,
    aggregates: HashMap<AggregateId, Aggregate>,
    contributions: HashMap<(String, EventId), AggregateId>,
    fanout: HashMap<(AggregateId, Uuid), FanoutEntry>,
    notifications: HashMap<(AggregateId, Uuid), NotificationEntry>,
    marks: HashMap<(EntityRef, Milestone), ThresholdMark>,
    samples: HashMap<(EntityRef, Milestone, Uuid), DateTime<Utc>>,
    reaction_kinds: Vec<ReactionKind>,
    votes: HashMap<(AggregateId, Uuid, ReactionKindId), ReactionVote>,
}

/// In-memory feed store.
pub struct MemoryFeedStore {
    state: RwLock<MemoryState>,
    failing_writes: AtomicUsize,
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::with_catalog(default_catalog())
    }

    pub fn with_catalog(reaction_kinds: Vec<ReactionKind>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                reaction_kinds,
                ..MemoryState::default()
            }),
            failing_writes: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` write operations fail with a transient database
    /// error.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Snapshot of every queued event in id order.
    pub fn events(&self) -> Vec<Event> {
        self.read().events.values().cloned().collect()
    }

    /// Snapshot of every stored aggregate, oldest first.
    pub fn aggregates(&self) -> Vec<Aggregate> {
        let mut aggregates: Vec<Aggregate> = self.read().aggregates.values().cloned().collect();
        aggregates.sort_by_key(|aggregate| (aggregate.created_at, aggregate.id));
        aggregates
    }

    pub fn mark_count(&self) -> usize {
        self.read().marks.len()
    }

    /// Number of stored threshold samples across every entity.
    pub fn sample_count(&self) -> usize {
        self.read().samples.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, RepositoryError> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| remaining.checked_sub(1));
        if injected.is_ok() {
            return Err(RepositoryError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        Ok(self.state.write().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for MemoryFeedStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Same catalog the PostgreSQL migration seeds.
pub fn default_catalog() -> Vec<ReactionKind> {
    [
        (1, "like", true),
        (2, "love", true),
        (3, "fire", true),
        (4, "gg", true),
        (5, "sad", false),
        (6, "angry", false),
    ]
    .into_iter()
    .map(|(id, label, is_positive)| ReactionKind {
        id,
        label: label.to_string(),
        is_positive,
        sort_order: id,
    })
    .collect()
}
