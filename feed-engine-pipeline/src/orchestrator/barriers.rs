use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use feed_engine_shared::types::EventId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Barrier {
    event_id: EventId,
    until: DateTime<Utc>,
}

/// Ordering keys whose earliest pending event is waiting out a retry.
///
/// Later events on a blocked key are deferred to the blocker's retry time so
/// they cannot overtake it. A barrier older than `stale_after` past its retry
/// time is dropped, since its event has evidently been handled elsewhere.
pub(crate) struct KeyBarriers {
    barriers: Mutex<HashMap<String, Barrier>>,
    stale_after: Duration,
}

impl KeyBarriers {
    pub(crate) fn new(stale_after: Duration) -> Self {
        Self {
            barriers: Mutex::new(HashMap::new()),
            stale_after,
        }
    }

    /// The time a partition must wait until, if any of its keys is blocked by
    /// an event that is not part of the partition itself.
    pub(crate) fn blocking(&self, keys: &[String], partition: &[EventId], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut barriers = self.barriers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut until = None;
        for key in keys {
            let Some(barrier) = barriers.get(key).copied() else {
                continue;
            };
            if barrier.until + self.stale_after < now {
                barriers.remove(key);
                continue;
            }
            if !partition.contains(&barrier.event_id) {
                until = until.max(Some(barrier.until));
            }
        }
        until
    }

    pub(crate) fn block(&self, keys: &[String], event_id: EventId, until: DateTime<Utc>) {
        let mut barriers = self.barriers.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            barriers.insert(key.clone(), Barrier { event_id, until });
        }
    }

    /// Lifts the barriers `event_id` is holding.
    pub(crate) fn release(&self, keys: &[String], event_id: EventId) {
        let mut barriers = self.barriers.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if barriers.get(key).is_some_and(|barrier| barrier.event_id == event_id) {
                barriers.remove(key);
            }
        }
    }
}
