use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregate::Milestone;
use super::entity::{EntityRef, EntityType};

/// Records that a milestone already fired for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdMark {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub milestone: Milestone,
    pub created_at: DateTime<Utc>,
}

impl ThresholdMark {
    pub fn new(entity: EntityRef, milestone: Milestone, created_at: DateTime<Utc>) -> Self {
        Self {
            entity_type: entity.entity_type,
            entity_id: entity.id,
            milestone,
            created_at,
        }
    }

    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.entity_id)
    }
}

/// One actor's contribution to a density milestone. At most one sample is kept
/// per (entity, milestone, actor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSample {
    pub entity: EntityRef,
    pub milestone: Milestone,
    pub actor_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}
