use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use feed_engine_repository::AggregateRepository;
use feed_engine_shared::types::{AggregateId, EntityRef, EntityType, ReferenceScope};
use tokio_retry::{
    RetryIf,
    strategy::{ExponentialBackoff, jitter},
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::MaintenanceConfig;
use crate::errors::MaintenanceError;

/// What stripping an entity did to one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripOutcome {
    Updated,
    /// The last id went away, so the aggregate and its cascades are gone.
    Deleted,
    /// Already gone or no longer referencing the entity.
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    pub updated: usize,
    pub deleted: usize,
}

impl RemovalSummary {
    fn record(&mut self, outcome: StripOutcome) {
        match outcome {
            StripOutcome::Updated => self.updated += 1,
            StripOutcome::Deleted => self.deleted += 1,
            StripOutcome::Unchanged => {}
        }
    }
}

/// Strips deleted or hidden entities out of the aggregates that reference
/// them, deleting aggregates left empty.
pub struct ReverseMaintainer {
    aggregates: Arc<dyn AggregateRepository>,
    config: MaintenanceConfig,
}

impl ReverseMaintainer {
    pub fn new(aggregates: Arc<dyn AggregateRepository>, config: MaintenanceConfig) -> Self {
        Self { aggregates, config }
    }

    pub async fn remove_reference(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<RemovalSummary, MaintenanceError> {
        self.remove_scoped(&EntityRef::new(entity_type, entity_id), &ReferenceScope::everywhere())
            .await
    }

    /// Works through the reverse index until no aggregate in `scope`
    /// references `entity`.
    #[instrument(skip(self), fields(entity = %entity))]
    pub async fn remove_scoped(
        &self,
        entity: &EntityRef,
        scope: &ReferenceScope,
    ) -> Result<RemovalSummary, MaintenanceError> {
        let mut summary = RemovalSummary::default();
        let mut visited: HashSet<AggregateId> = HashSet::new();

        for _ in 0..self.config.max_passes {
            let batch = self
                .aggregates
                .referencing_aggregates(entity, scope, self.config.batch_size)
                .await?;
            let fresh: Vec<AggregateId> = batch
                .iter()
                .map(|aggregate| aggregate.id)
                .filter(|id| visited.insert(*id))
                .collect();
            // Nothing left, or only aggregates already handled whose index rows
            // lag behind.
            if fresh.is_empty() {
                if summary != RemovalSummary::default() {
                    info!(updated = summary.updated, deleted = summary.deleted, "Removed references");
                }
                return Ok(summary);
            }
            for id in fresh {
                summary.record(self.strip(id, entity).await?);
            }
        }
        Err(MaintenanceError::IncompleteRemoval(entity.to_string()))
    }

    /// Removes `entity` from one aggregate, re-reading it on every conflict.
    pub async fn strip(
        &self,
        aggregate_id: AggregateId,
        entity: &EntityRef,
    ) -> Result<StripOutcome, MaintenanceError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(5)
            .max_delay(Duration::from_millis(500))
            .map(jitter)
            .take(self.config.max_conflict_retries);

        RetryIf::spawn(
            strategy,
            || self.try_strip(aggregate_id, entity),
            |err: &MaintenanceError| err.is_conflict(),
        )
        .await
        .map_err(|err| {
            if err.is_conflict() {
                MaintenanceError::ConflictRetriesExhausted {
                    entity: entity.to_string(),
                    aggregate_id,
                    attempts: self.config.max_conflict_retries + 1,
                }
            } else {
                err
            }
        })
    }

    async fn try_strip(
        &self,
        aggregate_id: AggregateId,
        entity: &EntityRef,
    ) -> Result<StripOutcome, MaintenanceError> {
        let Some(mut aggregate) = self.aggregates.get_aggregate(aggregate_id).await? else {
            return Ok(StripOutcome::Unchanged);
        };
        if !aggregate.remove_entity(entity) {
            return Ok(StripOutcome::Unchanged);
        }
        if aggregate.is_empty() {
            // Guarded so a merge landing after our read is not deleted with it.
            if !self
                .aggregates
                .delete_aggregate_if(aggregate_id, aggregate.version)
                .await?
            {
                return Ok(StripOutcome::Unchanged);
            }
            debug!(aggregate_id = %aggregate_id, "Deleted emptied aggregate");
            return Ok(StripOutcome::Deleted);
        }
        aggregate.updated_at = aggregate.updated_at.max(Utc::now());
        self.aggregates.update_aggregate(&aggregate).await?;
        Ok(StripOutcome::Updated)
    }

    /// Deletes every aggregate derived from a join row.
    #[instrument(skip(self), fields(anchor = %anchor))]
    pub async fn delete_anchored(&self, anchor: &EntityRef) -> Result<usize, MaintenanceError> {
        let mut deleted = 0;
        for aggregate in self.aggregates.anchored_aggregates(anchor).await? {
            if self.aggregates.delete_aggregate(aggregate.id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Deletes every aggregate owned by a removed user.
    #[instrument(skip(self))]
    pub async fn purge_owner(&self, owner_id: Uuid) -> Result<usize, MaintenanceError> {
        let mut deleted = 0;
        for _ in 0..self.config.max_passes {
            let owned = self
                .aggregates
                .aggregates_owned_by(owner_id, self.config.batch_size)
                .await?;
            if owned.is_empty() {
                return Ok(deleted);
            }
            for aggregate in owned {
                if self.aggregates.delete_aggregate(aggregate.id).await? {
                    deleted += 1;
                }
            }
        }
        Err(MaintenanceError::IncompleteRemoval(EntityRef::user(owner_id).to_string()))
    }

    pub async fn set_language(
        &self,
        owner_id: Uuid,
        language: Option<&str>,
    ) -> Result<u64, MaintenanceError> {
        Ok(self.aggregates.set_language(owner_id, language).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use feed_engine_repository::{FanoutRepository, MemoryFeedStore, ReactionRepository, RepositoryError};
    use feed_engine_shared::types::{
        Aggregate, AggregateAction, CategoryName, EventId, GroupingKey, ReactionCounts, ReactionVote,
    };

    fn maintainer(store: Arc<MemoryFeedStore>) -> ReverseMaintainer {
        ReverseMaintainer::new(store, MaintenanceConfig::default())
    }

    async fn games_aggregate(store: &MemoryFeedStore, owner: Uuid, games: &[Uuid]) -> Aggregate {
        let key = GroupingKey::new(AggregateAction::GameStatus, Some(owner));
        let mut aggregate = Aggregate::new(&key, 0, 1, Utc::now());
        for game in games {
            aggregate.append(CategoryName::Games, *game, Some("owned")).unwrap();
        }
        store.insert_aggregate(&aggregate).await.unwrap();
        aggregate
    }

    fn games_of(store: &MemoryFeedStore, id: AggregateId) -> Vec<Uuid> {
        store
            .aggregates()
            .into_iter()
            .find(|aggregate| aggregate.id == id)
            .map(|aggregate| aggregate.categories[&CategoryName::Games].ids().to_vec())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_removal_keeps_other_ids_in_order() {
        let store = Arc::new(MemoryFeedStore::new());
        let maintainer = maintainer(store.clone());
        let g: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let aggregate = games_aggregate(&store, Uuid::new_v4(), &g).await;

        let summary = maintainer.remove_reference(EntityType::Game, g[0]).await.unwrap();
        assert_eq!(summary, RemovalSummary { updated: 1, deleted: 0 });
        assert_eq!(games_of(&store, aggregate.id), vec![g[1], g[2]]);

        maintainer.remove_reference(EntityType::Game, g[2]).await.unwrap();
        assert_eq!(games_of(&store, aggregate.id), vec![g[1]]);
    }

    #[tokio::test]
    async fn test_emptied_aggregate_is_deleted_with_cascades() {
        let store = Arc::new(MemoryFeedStore::new());
        let maintainer = maintainer(store.clone());
        let game = Uuid::new_v4();
        let aggregate = games_aggregate(&store, Uuid::new_v4(), &[game]).await;
        let follower = Uuid::new_v4();
        store.upsert_fanout(aggregate.id, &[follower], Utc::now()).await.unwrap();
        store.upsert_notification(aggregate.id, follower, Utc::now()).await.unwrap();
        store
            .insert_vote(&ReactionVote {
                id: Uuid::new_v4(),
                aggregate_id: aggregate.id,
                voter_id: follower,
                reaction_kind_id: 1,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let summary = maintainer.remove_reference(EntityType::Game, game).await.unwrap();
        assert_eq!(summary.deleted, 1);
        assert!(store.aggregates().is_empty());
        assert!(store.fanout_entries_for(aggregate.id).await.unwrap().is_empty());
        assert!(store.notification_entries_for(aggregate.id).await.unwrap().is_empty());
        assert!(store.count_votes(aggregate.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scope_limits_removal_to_one_owner() {
        let store = Arc::new(MemoryFeedStore::new());
        let maintainer = maintainer(store.clone());
        let game = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let alices = games_aggregate(&store, alice, &[game, Uuid::new_v4()]).await;
        let bobs = games_aggregate(&store, bob, &[game]).await;

        maintainer
            .remove_scoped(
                &EntityRef::game(game),
                &ReferenceScope::owned_by(alice, AggregateAction::GameStatus),
            )
            .await
            .unwrap();

        assert!(!games_of(&store, alices.id).contains(&game));
        assert_eq!(games_of(&store, bobs.id), vec![game]);
    }

    #[tokio::test]
    async fn test_removal_is_rerunnable_and_pages_through_many_aggregates() {
        let store = Arc::new(MemoryFeedStore::new());
        let maintainer = ReverseMaintainer::new(
            store.clone(),
            MaintenanceConfig {
                batch_size: 2,
                ..MaintenanceConfig::default()
            },
        );
        let game = Uuid::new_v4();
        for _ in 0..5 {
            games_aggregate(&store, Uuid::new_v4(), &[game, Uuid::new_v4()]).await;
        }

        let summary = maintainer.remove_reference(EntityType::Game, game).await.unwrap();
        assert_eq!(summary.updated, 5);
        let again = maintainer.remove_reference(EntityType::Game, game).await.unwrap();
        assert_eq!(again, RemovalSummary::default());
    }

    #[tokio::test]
    async fn test_delete_anchored_and_purge_owner() {
        let store = Arc::new(MemoryFeedStore::new());
        let maintainer = maintainer(store.clone());
        let owner = Uuid::new_v4();
        let join = EntityRef::new(EntityType::CollectionGame, Uuid::new_v4());

        let key = GroupingKey::new(AggregateAction::CollectionGameAdded, Some(owner));
        let mut anchored = Aggregate::new(&key, 0, 1, Utc::now());
        anchored.append(CategoryName::Games, Uuid::new_v4(), None).unwrap();
        anchored.anchor = Some(join);
        store.insert_aggregate(&anchored).await.unwrap();
        games_aggregate(&store, owner, &[Uuid::new_v4()]).await;

        assert_eq!(maintainer.delete_anchored(&join).await.unwrap(), 1);
        assert_eq!(store.aggregates().len(), 1);
        assert_eq!(maintainer.purge_owner(owner).await.unwrap(), 1);
        assert!(store.aggregates().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_surfaces() {
        let store = Arc::new(MemoryFeedStore::new());
        let maintainer = maintainer(store.clone());
        let game = Uuid::new_v4();
        games_aggregate(&store, Uuid::new_v4(), &[game, Uuid::new_v4()]).await;

        store.fail_next_writes(1);
        let err = maintainer.remove_reference(EntityType::Game, game).await.unwrap_err();
        assert!(err.is_transient());

        let summary = maintainer.remove_reference(EntityType::Game, game).await.unwrap();
        assert_eq!(summary.updated, 1);
    }

    /// Appends `late_game` to an aggregate right after the first read of it,
    /// the way a merge running between a read and a write would.
    struct MergeAfterRead {
        inner: Arc<MemoryFeedStore>,
        late_game: Uuid,
        merged: AtomicBool,
    }

    #[async_trait]
    impl AggregateRepository for MergeAfterRead {
        async fn latest_for_key(&self, grouping_key: &str) -> Result<Option<Aggregate>, RepositoryError> {
            self.inner.latest_for_key(grouping_key).await
        }

        async fn get_aggregate(&self, id: AggregateId) -> Result<Option<Aggregate>, RepositoryError> {
            let read = self.inner.get_aggregate(id).await?;
            if let Some(current) = &read {
                if !self.merged.swap(true, Ordering::SeqCst) {
                    let mut grown = current.clone();
                    grown.append(CategoryName::Games, self.late_game, Some("owned")).unwrap();
                    self.inner.update_aggregate(&grown).await?;
                }
            }
            Ok(read)
        }

        async fn get_aggregates(&self, ids: &[AggregateId]) -> Result<Vec<Aggregate>, RepositoryError> {
            self.inner.get_aggregates(ids).await
        }

        async fn aggregate_for_event(
            &self,
            grouping_key: &str,
            event_id: EventId,
        ) -> Result<Option<Aggregate>, RepositoryError> {
            self.inner.aggregate_for_event(grouping_key, event_id).await
        }

        async fn insert_aggregate(&self, aggregate: &Aggregate) -> Result<(), RepositoryError> {
            self.inner.insert_aggregate(aggregate).await
        }

        async fn update_aggregate(&self, aggregate: &Aggregate) -> Result<Aggregate, RepositoryError> {
            self.inner.update_aggregate(aggregate).await
        }

        async fn append_aggregate(
            &self,
            aggregate: &Aggregate,
            event_id: EventId,
        ) -> Result<Aggregate, RepositoryError> {
            self.inner.append_aggregate(aggregate, event_id).await
        }

        async fn record_contribution(
            &self,
            grouping_key: &str,
            event_id: EventId,
            aggregate_id: AggregateId,
        ) -> Result<bool, RepositoryError> {
            self.inner.record_contribution(grouping_key, event_id, aggregate_id).await
        }

        async fn delete_aggregate(&self, id: AggregateId) -> Result<bool, RepositoryError> {
            self.inner.delete_aggregate(id).await
        }

        async fn delete_aggregate_if(
            &self,
            id: AggregateId,
            expected_version: i64,
        ) -> Result<bool, RepositoryError> {
            self.inner.delete_aggregate_if(id, expected_version).await
        }

        async fn referencing_aggregates(
            &self,
            entity: &EntityRef,
            scope: &ReferenceScope,
            limit: usize,
        ) -> Result<Vec<Aggregate>, RepositoryError> {
            self.inner.referencing_aggregates(entity, scope, limit).await
        }

        async fn anchored_aggregates(&self, anchor: &EntityRef) -> Result<Vec<Aggregate>, RepositoryError> {
            self.inner.anchored_aggregates(anchor).await
        }

        async fn aggregates_owned_by(
            &self,
            owner_id: Uuid,
            limit: usize,
        ) -> Result<Vec<Aggregate>, RepositoryError> {
            self.inner.aggregates_owned_by(owner_id, limit).await
        }

        async fn set_language(&self, owner_id: Uuid, language: Option<&str>) -> Result<u64, RepositoryError> {
            self.inner.set_language(owner_id, language).await
        }

        async fn set_reaction_counts(
            &self,
            id: AggregateId,
            counts: &ReactionCounts,
        ) -> Result<bool, RepositoryError> {
            self.inner.set_reaction_counts(id, counts).await
        }
    }

    #[tokio::test]
    async fn test_emptying_strip_keeps_a_merge_that_landed_after_the_read() {
        let store = Arc::new(MemoryFeedStore::new());
        let (stripped, late) = (Uuid::new_v4(), Uuid::new_v4());
        let aggregate = games_aggregate(&store, Uuid::new_v4(), &[stripped]).await;
        let racing = Arc::new(MergeAfterRead {
            inner: store.clone(),
            late_game: late,
            merged: AtomicBool::new(false),
        });
        let maintainer = ReverseMaintainer::new(racing, MaintenanceConfig::default());

        let summary = maintainer.remove_reference(EntityType::Game, stripped).await.unwrap();

        assert_eq!(summary, RemovalSummary { updated: 1, deleted: 0 });
        assert_eq!(store.aggregates().len(), 1);
        assert_eq!(games_of(&store, aggregate.id), vec![late]);
    }
}
