use async_trait::async_trait;
use feed_engine_shared::types::{
    Aggregate, AggregateId, EntityRef, EventId, ReactionCounts, ReferenceScope,
};
use uuid::Uuid;

use super::{MemoryFeedStore, MemoryState};
use crate::errors::RepositoryError;
use crate::interfaces::AggregateRepository;

impl MemoryState {
    /// Removes an aggregate and every row that cascades from it.
    fn remove_aggregate(&mut self, id: AggregateId) -> bool {
        if self.aggregates.remove(&id).is_none() {
            return false;
        }
        self.fanout.retain(|(aggregate_id, _), _| *aggregate_id != id);
        self.notifications.retain(|(aggregate_id, _), _| *aggregate_id != id);
        self.votes.retain(|(aggregate_id, _, _), _| *aggregate_id != id);
        self.contributions.retain(|_, aggregate_id| *aggregate_id != id);
        true
    }

    /// Version-checked write of the mutable columns.
    fn apply_update(&mut self, aggregate: &Aggregate) -> Result<Aggregate, RepositoryError> {
        let Some(stored) = self.aggregates.get_mut(&aggregate.id) else {
            return Err(RepositoryError::conflict(format!(
                "aggregate {} no longer exists",
                aggregate.id
            )));
        };
        if stored.version != aggregate.version {
            return Err(RepositoryError::conflict(format!(
                "aggregate {} moved past version {}",
                aggregate.id, aggregate.version
            )));
        }

        stored.categories = aggregate.categories.clone();
        stored.language = aggregate.language.clone();
        stored.anchor = aggregate.anchor;
        stored.updated_at = aggregate.updated_at;
        stored.version += 1;
        Ok(stored.clone())
    }
}

fn sorted_oldest_first(mut aggregates: Vec<Aggregate>) -> Vec<Aggregate> {
    aggregates.sort_by_key(|aggregate| (aggregate.created_at, aggregate.id));
    aggregates
}

#[async_trait]
impl AggregateRepository for MemoryFeedStore {
    async fn latest_for_key(&self, grouping_key: &str) -> Result<Option<Aggregate>, RepositoryError> {
        Ok(self
            .read()
            .aggregates
            .values()
            .filter(|aggregate| aggregate.grouping_key == grouping_key)
            .max_by_key(|aggregate| aggregate.generation)
            .cloned())
    }

    async fn get_aggregate(&self, id: AggregateId) -> Result<Option<Aggregate>, RepositoryError> {
        Ok(self.read().aggregates.get(&id).cloned())
    }

    async fn get_aggregates(&self, ids: &[AggregateId]) -> Result<Vec<Aggregate>, RepositoryError> {
        let state = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.aggregates.get(id).cloned())
            .collect())
    }

    async fn aggregate_for_event(
        &self,
        grouping_key: &str,
        event_id: EventId,
    ) -> Result<Option<Aggregate>, RepositoryError> {
        let state = self.read();
        Ok(state
            .contributions
            .get(&(grouping_key.to_string(), event_id))
            .and_then(|id| state.aggregates.get(id))
            .cloned())
    }

    async fn insert_aggregate(&self, aggregate: &Aggregate) -> Result<(), RepositoryError> {
        let mut state = self.write()?;
        let taken = state.aggregates.values().any(|existing| {
            existing.grouping_key == aggregate.grouping_key
                && existing.generation == aggregate.generation
        });
        if taken || state.aggregates.contains_key(&aggregate.id) {
            return Err(RepositoryError::conflict(format!(
                "aggregate {} generation {} already exists",
                aggregate.grouping_key, aggregate.generation
            )));
        }
        state.aggregates.insert(aggregate.id, aggregate.clone());
        state.contributions.insert(
            (aggregate.grouping_key.clone(), aggregate.origin_event_id),
            aggregate.id,
        );
        Ok(())
    }

    async fn update_aggregate(&self, aggregate: &Aggregate) -> Result<Aggregate, RepositoryError> {
        self.write()?.apply_update(aggregate)
    }

    async fn append_aggregate(
        &self,
        aggregate: &Aggregate,
        event_id: EventId,
    ) -> Result<Aggregate, RepositoryError> {
        let mut state = self.write()?;
        let stored = state.apply_update(aggregate)?;
        state
            .contributions
            .entry((stored.grouping_key.clone(), event_id))
            .or_insert(stored.id);
        Ok(stored)
    }

    async fn record_contribution(
        &self,
        grouping_key: &str,
        event_id: EventId,
        aggregate_id: AggregateId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        if !state.aggregates.contains_key(&aggregate_id) {
            return Ok(false);
        }
        let key = (grouping_key.to_string(), event_id);
        if state.contributions.contains_key(&key) {
            return Ok(false);
        }
        state.contributions.insert(key, aggregate_id);
        Ok(true)
    }

    async fn delete_aggregate(&self, id: AggregateId) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        Ok(state.remove_aggregate(id))
    }

    async fn delete_aggregate_if(
        &self,
        id: AggregateId,
        expected_version: i64,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        match state.aggregates.get(&id) {
            None => Ok(false),
            Some(stored) if stored.version != expected_version => Err(RepositoryError::conflict(
                format!("aggregate {id} moved past version {expected_version}"),
            )),
            Some(_) => Ok(state.remove_aggregate(id)),
        }
    }

    async fn referencing_aggregates(
        &self,
        entity: &EntityRef,
        scope: &ReferenceScope,
        limit: usize,
    ) -> Result<Vec<Aggregate>, RepositoryError> {
        let matching = self
            .read()
            .aggregates
            .values()
            .filter(|aggregate| scope.matches(aggregate))
            .filter(|aggregate| aggregate.referenced_entities().contains(entity))
            .cloned()
            .collect();

        Ok(sorted_oldest_first(matching).into_iter().take(limit).collect())
    }

    async fn anchored_aggregates(&self, anchor: &EntityRef) -> Result<Vec<Aggregate>, RepositoryError> {
        let matching = self
            .read()
            .aggregates
            .values()
            .filter(|aggregate| aggregate.anchor.as_ref() == Some(anchor))
            .cloned()
            .collect();

        Ok(sorted_oldest_first(matching))
    }

    async fn aggregates_owned_by(
        &self,
        owner_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Aggregate>, RepositoryError> {
        let owned = self
            .read()
            .aggregates
            .values()
            .filter(|aggregate| aggregate.owner_id == Some(owner_id))
            .cloned()
            .collect();

        Ok(sorted_oldest_first(owned).into_iter().rev().take(limit).collect())
    }

    async fn set_language(&self, owner_id: Uuid, language: Option<&str>) -> Result<u64, RepositoryError> {
        let mut state = self.write()?;
        let mut touched = 0;
        for aggregate in state.aggregates.values_mut() {
            if aggregate.owner_id == Some(owner_id) && aggregate.language.as_deref() != language {
                aggregate.language = language.map(str::to_string);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn set_reaction_counts(
        &self,
        id: AggregateId,
        counts: &ReactionCounts,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        match state.aggregates.get_mut(&id) {
            Some(aggregate) => {
                aggregate.reaction_counts = counts.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feed_engine_shared::types::{AggregateAction, CategoryName, GroupingKey};

    fn aggregate_with_reviews(owner: Uuid, reviews: &[Uuid]) -> Aggregate {
        let key = GroupingKey::new(AggregateAction::ReviewPosted, Some(owner));
        let mut aggregate = Aggregate::new(&key, 0, 1, Utc::now());
        for review in reviews {
            aggregate.append(CategoryName::Reviews, *review, None).unwrap();
        }
        aggregate
    }

    #[tokio::test]
    async fn test_insert_conflicts_on_same_generation() {
        let store = MemoryFeedStore::new();
        let owner = Uuid::new_v4();
        store.insert_aggregate(&aggregate_with_reviews(owner, &[Uuid::new_v4()])).await.unwrap();

        let err = store
            .insert_aggregate(&aggregate_with_reviews(owner, &[Uuid::new_v4()]))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let store = MemoryFeedStore::new();
        let aggregate = aggregate_with_reviews(Uuid::new_v4(), &[Uuid::new_v4()]);
        store.insert_aggregate(&aggregate).await.unwrap();

        let mut first = aggregate.clone();
        first.append(CategoryName::Reviews, Uuid::new_v4(), None).unwrap();
        let stored = store.update_aggregate(&first).await.unwrap();
        assert_eq!(stored.version, 1);

        let mut stale = aggregate.clone();
        stale.append(CategoryName::Reviews, Uuid::new_v4(), None).unwrap();
        assert!(store.update_aggregate(&stale).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_referencing_aggregates_respects_scope() {
        let store = MemoryFeedStore::new();
        let review = Uuid::new_v4();
        let owner = Uuid::new_v4();
        store.insert_aggregate(&aggregate_with_reviews(owner, &[review])).await.unwrap();
        store.insert_aggregate(&aggregate_with_reviews(Uuid::new_v4(), &[review])).await.unwrap();

        let entity = EntityRef::review(review);
        let everywhere = store
            .referencing_aggregates(&entity, &ReferenceScope::everywhere(), 10)
            .await
            .unwrap();
        assert_eq!(everywhere.len(), 2);

        let scoped = store
            .referencing_aggregates(
                &entity,
                &ReferenceScope::owned_by(owner, AggregateAction::ReviewPosted),
                10,
            )
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].owner_id, Some(owner));
    }

    #[tokio::test]
    async fn test_guarded_delete_refuses_a_moved_version() {
        let store = MemoryFeedStore::new();
        let aggregate = aggregate_with_reviews(Uuid::new_v4(), &[Uuid::new_v4()]);
        store.insert_aggregate(&aggregate).await.unwrap();

        let mut grown = aggregate.clone();
        grown.append(CategoryName::Reviews, Uuid::new_v4(), None).unwrap();
        let stored = store.update_aggregate(&grown).await.unwrap();

        let err = store.delete_aggregate_if(aggregate.id, aggregate.version).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.aggregates().len(), 1);

        assert!(store.delete_aggregate_if(aggregate.id, stored.version).await.unwrap());
        assert!(!store.delete_aggregate_if(aggregate.id, stored.version).await.unwrap());
    }

    #[tokio::test]
    async fn test_contributions_find_older_generations() {
        let store = MemoryFeedStore::new();
        let owner = Uuid::new_v4();
        let first = aggregate_with_reviews(owner, &[Uuid::new_v4()]);
        store.insert_aggregate(&first).await.unwrap();

        let key = first.grouping_key.clone();
        let mut later = first.clone();
        later.append(CategoryName::Reviews, Uuid::new_v4(), None).unwrap();
        store.append_aggregate(&later, 7).await.unwrap();

        let found = store.aggregate_for_event(&key, first.origin_event_id).await.unwrap();
        assert_eq!(found.map(|aggregate| aggregate.id), Some(first.id));
        let found = store.aggregate_for_event(&key, 7).await.unwrap();
        assert_eq!(found.map(|aggregate| aggregate.id), Some(first.id));
        assert!(store.aggregate_for_event(&key, 8).await.unwrap().is_none());

        assert!(store.record_contribution(&key, 8, first.id).await.unwrap());
        assert!(!store.record_contribution(&key, 8, first.id).await.unwrap());

        store.delete_aggregate(first.id).await.unwrap();
        assert!(store.aggregate_for_event(&key, 8).await.unwrap().is_none());
    }
}
