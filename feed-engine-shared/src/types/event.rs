use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::entity::{EntityRef, EntityType, ParseEnumError};

/// Queue position of an event. Assigned at enqueue time, so ordering by id is
/// ordering by creation.
pub type EventId = i64;

/// The kind of domain mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Addition,
    Deletion,
    LanguageChange,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Addition => "addition",
            EventAction::Deletion => "deletion",
            EventAction::LanguageChange => "language_change",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "addition" => Ok(EventAction::Addition),
            "deletion" => Ok(EventAction::Deletion),
            "language_change" => Ok(EventAction::LanguageChange),
            other => Err(ParseEnumError::new("event action", other)),
        }
    }
}

/// Processing state of a queued event.
///
/// `New -> Started -> {Finished, Delayed, Error, Empty}`, `Delayed -> Started`.
/// `Finished`, `Empty` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    New,
    Started,
    Finished,
    Delayed,
    Empty,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "new",
            EventStatus::Started => "started",
            EventStatus::Finished => "finished",
            EventStatus::Delayed => "delayed",
            EventStatus::Empty => "empty",
            EventStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Finished | EventStatus::Empty | EventStatus::Error)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(EventStatus::New),
            "started" => Ok(EventStatus::Started),
            "finished" => Ok(EventStatus::Finished),
            "delayed" => Ok(EventStatus::Delayed),
            "empty" => Ok(EventStatus::Empty),
            "error" => Ok(EventStatus::Error),
            other => Err(ParseEnumError::new("event status", other)),
        }
    }
}

/// An event as handed over by a domain-mutation hook, before it has been
/// assigned a queue position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub action: EventAction,
    pub actor_id: Option<Uuid>,
    pub extra: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(entity_type: EntityType, entity_id: Uuid, action: EventAction) -> Self {
        Self {
            entity_type,
            entity_id,
            action,
            actor_id: None,
            extra: serde_json::Value::Object(serde_json::Map::new()),
            occurred_at: Utc::now(),
        }
    }

    pub fn addition(entity_type: EntityType, entity_id: Uuid) -> Self {
        Self::new(entity_type, entity_id, EventAction::Addition)
    }

    pub fn deletion(entity_type: EntityType, entity_id: Uuid) -> Self {
        Self::new(entity_type, entity_id, EventAction::Deletion)
    }

    pub fn language_change(entity_type: EntityType, entity_id: Uuid) -> Self {
        Self::new(entity_type, entity_id, EventAction::LanguageChange)
    }

    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

/// A queued event with its scheduling and retry state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub action: EventAction,
    pub actor_id: Option<Uuid>,
    pub extra: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub status: EventStatus,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Event {
    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.entity_id)
    }

    /// Materialises a queued event from its pending form.
    pub fn from_new(id: EventId, event: &NewEvent, now: DateTime<Utc>) -> Self {
        Self {
            id,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            action: event.action,
            actor_id: event.actor_id,
            extra: event.extra.clone(),
            occurred_at: event.occurred_at,
            scheduled_at: now,
            status: EventStatus::New,
            retry_count: 0,
            created_at: now,
            started_at: None,
            last_error: None,
        }
    }
}

/// Result of processing one event, reported back to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event was applied.
    Finished,
    /// The event carried no feed-worthy change.
    Empty,
    /// An earlier event on the same grouping key failed; try again at the
    /// given time without consuming a retry.
    Deferred(DateTime<Utc>),
    /// A retryable failure.
    Transient(String),
    /// A malformed event or a failure that retrying cannot fix.
    Permanent(String),
}

/// Bounded exponential backoff applied to transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: Duration::seconds(1),
            backoff_max: Duration::hours(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`,
    /// capped at `backoff_max`.
    pub fn delay_for(&self, attempt: i32) -> Duration {
        let exponent = attempt.saturating_sub(1).clamp(0, 30) as u32;
        let multiplier = 1i64 << exponent;
        let millis = self
            .backoff_base
            .num_milliseconds()
            .saturating_mul(multiplier)
            .min(self.backoff_max.num_milliseconds());
        Duration::milliseconds(millis)
    }

    pub fn exhausted(&self, attempt: i32) -> bool {
        attempt > self.max_retries
    }
}
