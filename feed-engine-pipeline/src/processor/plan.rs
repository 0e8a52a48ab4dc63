use feed_engine_shared::types::{
    CategoryName, EntityRef, Event, GroupingKey, Milestone, ReferenceScope, ThresholdSample,
};
use uuid::Uuid;

/// One id to append to one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryAddition {
    pub category: CategoryName,
    pub id: Uuid,
    /// Sub-group key for grouped categories.
    pub group: Option<String>,
}

/// Merge one or more ids into the aggregate selected by `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInstruction {
    pub key: GroupingKey,
    pub additions: Vec<CategoryAddition>,
    /// Skip the latest aggregate for the key and open a new generation.
    pub start_new: bool,
    pub anchor: Option<EntityRef>,
    pub language: Option<String>,
}

impl MergeInstruction {
    pub fn new(key: GroupingKey) -> Self {
        Self {
            key,
            additions: Vec::new(),
            start_new: false,
            anchor: None,
            language: None,
        }
    }

    pub fn add(mut self, category: CategoryName, id: Uuid) -> Self {
        self.additions.push(CategoryAddition {
            category,
            id,
            group: None,
        });
        self
    }

    pub fn add_grouped(mut self, category: CategoryName, id: Uuid, group: impl Into<String>) -> Self {
        self.additions.push(CategoryAddition {
            category,
            id,
            group: Some(group.into()),
        });
        self
    }

    pub fn starting_new(mut self) -> Self {
        self.start_new = true;
        self
    }

    pub fn anchored_on(mut self, anchor: EntityRef) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }
}

/// Strip an entity from the aggregates that reference it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub entity: EntityRef,
    pub scope: ReferenceScope,
}

impl Removal {
    pub fn everywhere(entity: EntityRef) -> Self {
        Self {
            entity,
            scope: ReferenceScope::everywhere(),
        }
    }

    pub fn scoped(entity: EntityRef, scope: ReferenceScope) -> Self {
        Self { entity, scope }
    }

    /// A removal scoped to one owner and action serialises with the merges of
    /// that grouping key; an unscoped one with everything else touching the
    /// entity.
    pub fn ordering_key(&self) -> String {
        match (self.scope.action, self.scope.owner_id) {
            (Some(action), Some(owner)) => GroupingKey::new(action, Some(owner)).to_string(),
            _ => self.entity.to_string(),
        }
    }
}

/// Old and new values of a monotonic counter on `subject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterCheck {
    pub subject: EntityRef,
    pub milestone: Milestone,
    pub old: i64,
    pub new: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageChange {
    pub owner_id: Uuid,
    pub language: Option<String>,
}

/// Everything one event implies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPlan {
    pub merges: Vec<MergeInstruction>,
    pub removals: Vec<Removal>,
    /// Join rows whose derived aggregates are deleted outright.
    pub anchored_deletions: Vec<EntityRef>,
    /// Owners whose aggregates are deleted outright.
    pub owner_purges: Vec<Uuid>,
    pub counters: Vec<CounterCheck>,
    pub samples: Vec<ThresholdSample>,
    pub language: Option<LanguageChange>,
}

impl EventPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(mut self, instruction: MergeInstruction) -> Self {
        self.merges.push(instruction);
        self
    }

    pub fn remove(mut self, removal: Removal) -> Self {
        self.removals.push(removal);
        self
    }

    pub fn delete_anchored(mut self, anchor: EntityRef) -> Self {
        self.anchored_deletions.push(anchor);
        self
    }

    pub fn purge_owner(mut self, owner_id: Uuid) -> Self {
        self.owner_purges.push(owner_id);
        self
    }

    pub fn check_counter(mut self, check: CounterCheck) -> Self {
        self.counters.push(check);
        self
    }

    pub fn sample(mut self, sample: ThresholdSample) -> Self {
        self.samples.push(sample);
        self
    }

    pub fn relanguage(mut self, owner_id: Uuid, language: Option<String>) -> Self {
        self.language = Some(LanguageChange { owner_id, language });
        self
    }

    /// Whether the plan mutates aggregates regardless of thresholds.
    pub fn has_mutations(&self) -> bool {
        !self.merges.is_empty()
            || !self.removals.is_empty()
            || !self.anchored_deletions.is_empty()
            || !self.owner_purges.is_empty()
            || self.language.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_mutations() && self.counters.is_empty() && self.samples.is_empty()
    }

    /// Keys this plan touches. Events sharing any key are applied strictly in
    /// queue order: the grouping keys it merges into, every entity it adds or
    /// removes, anchors and owners.
    pub fn ordering_keys(&self, event: &Event) -> Vec<String> {
        let mut keys = Vec::new();
        for merge in &self.merges {
            keys.push(merge.key.to_string());
            keys.extend(
                merge
                    .additions
                    .iter()
                    .map(|addition| EntityRef::new(addition.category.entity_type(), addition.id).to_string()),
            );
            keys.extend(merge.anchor.map(|anchor| anchor.to_string()));
        }
        for removal in &self.removals {
            keys.push(removal.ordering_key());
            keys.push(removal.entity.to_string());
        }
        keys.extend(self.anchored_deletions.iter().map(ToString::to_string));
        keys.extend(self.owner_purges.iter().map(|owner| EntityRef::user(*owner).to_string()));
        keys.extend(self.language.iter().map(|change| EntityRef::user(change.owner_id).to_string()));
        if keys.is_empty() {
            keys.push(event.entity().to_string());
        }
        keys.sort();
        keys.dedup();
        keys
    }
}
