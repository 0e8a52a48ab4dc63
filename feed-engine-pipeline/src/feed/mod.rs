//! Read and write operations exposed to the API layer.
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use feed_engine_repository::{AggregateRepository, FanoutRepository, ReactionRepository, RepositoryError};
use feed_engine_shared::types::{
    Aggregate, AggregateId, AggregateView, CategoryView, EntityType, FeedCursor, FeedEntry, FeedPage,
    ReactionKind, ReactionKindId, ReactionVote,
};
use futures::future::try_join_all;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::capabilities::EntityResolver;
use crate::errors::FeedError;
use crate::maintenance::{MaintenanceTask, ReactionRollup};

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Global display limit; each category shows at most half of it.
    pub display_limit: usize,
    pub max_page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            display_limit: 12,
            max_page_size: 50,
        }
    }
}

impl FeedConfig {
    pub fn category_cap(&self) -> usize {
        (self.display_limit / 2).max(1)
    }
}

pub struct FeedService {
    fanout: Arc<dyn FanoutRepository>,
    aggregates: Arc<dyn AggregateRepository>,
    reactions: Arc<dyn ReactionRepository>,
    resolver: Arc<dyn EntityResolver>,
    rollup: Arc<ReactionRollup>,
    tasks: Option<mpsc::Sender<MaintenanceTask>>,
    config: FeedConfig,
}

impl FeedService {
    pub fn new(
        fanout: Arc<dyn FanoutRepository>,
        aggregates: Arc<dyn AggregateRepository>,
        reactions: Arc<dyn ReactionRepository>,
        resolver: Arc<dyn EntityResolver>,
        rollup: Arc<ReactionRollup>,
        config: FeedConfig,
    ) -> Self {
        Self {
            fanout,
            aggregates,
            reactions,
            resolver,
            rollup,
            tasks: None,
            config,
        }
    }

    /// Routes rollups through the orchestrator's maintenance channel instead
    /// of running them inline.
    pub fn with_task_sender(mut self, tasks: mpsc::Sender<MaintenanceTask>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// One page of the viewer's feed and notifications, newest first.
    #[instrument(skip(self, cursor))]
    pub async fn list_feed(
        &self,
        viewer_id: Uuid,
        cursor: Option<FeedCursor>,
        page_size: usize,
    ) -> Result<FeedPage, FeedError> {
        let page_size = page_size.clamp(1, self.config.max_page_size);
        let mut entries = self.fanout.feed_entries(viewer_id, cursor, page_size + 1).await?;
        let has_more = entries.len() > page_size;
        entries.truncate(page_size);
        let next_cursor = if has_more {
            entries.last().map(FeedEntry::cursor)
        } else {
            None
        };

        let ids: Vec<AggregateId> = entries.iter().map(|entry| entry.aggregate_id).collect();
        let aggregates: HashMap<AggregateId, Aggregate> = self
            .aggregates
            .get_aggregates(&ids)
            .await?
            .into_iter()
            .map(|aggregate| (aggregate.id, aggregate))
            .collect();
        let my_votes = self.reactions.votes_by_voter(viewer_id, &ids).await?;
        let resolved = self.resolve_displayed(aggregates.values()).await?;

        let items = entries
            .iter()
            .filter_map(|entry| {
                let Some(aggregate) = aggregates.get(&entry.aggregate_id) else {
                    debug!(aggregate_id = %entry.aggregate_id, "Feed entry outlived its aggregate");
                    return None;
                };
                Some(self.view(aggregate, entry, &resolved, &my_votes))
            })
            .collect();

        Ok(FeedPage {
            items,
            next_cursor,
            unread_notifications: self.fanout.unread_notifications(viewer_id).await?,
        })
    }

    /// Resolves every displayed id, one batch per entity type.
    async fn resolve_displayed<'a>(
        &self,
        aggregates: impl Iterator<Item = &'a Aggregate>,
    ) -> Result<HashMap<(EntityType, Uuid), serde_json::Value>, FeedError> {
        let cap = self.config.category_cap();
        let mut wanted: HashMap<EntityType, BTreeSet<Uuid>> = HashMap::new();
        for aggregate in aggregates {
            for (name, category) in &aggregate.categories {
                wanted
                    .entry(name.entity_type())
                    .or_default()
                    .extend(category.displayed(cap));
            }
        }

        let batches = try_join_all(wanted.into_iter().map(|(entity_type, ids)| async move {
            let ids: Vec<Uuid> = ids.into_iter().collect();
            let resolved = self.resolver.resolve(entity_type, &ids).await?;
            Ok::<_, FeedError>((entity_type, resolved))
        }))
        .await?;

        Ok(batches
            .into_iter()
            .flat_map(|(entity_type, resolved)| {
                resolved
                    .into_iter()
                    .map(move |(id, value)| ((entity_type, id), value))
            })
            .collect())
    }

    fn view(
        &self,
        aggregate: &Aggregate,
        entry: &FeedEntry,
        resolved: &HashMap<(EntityType, Uuid), serde_json::Value>,
        my_votes: &HashMap<AggregateId, Vec<ReactionKindId>>,
    ) -> AggregateView {
        let cap = self.config.category_cap();
        let categories = aggregate
            .categories
            .iter()
            .map(|(name, category)| CategoryView {
                name: *name,
                displayed: category
                    .displayed(cap)
                    .into_iter()
                    .filter_map(|id| resolved.get(&(name.entity_type(), id)).cloned())
                    .collect(),
                total: category.total(),
                groups: category.group_totals(),
            })
            .collect();

        AggregateView {
            aggregate_id: aggregate.id,
            action: aggregate.action,
            owner_id: aggregate.owner_id,
            language: aggregate.language.clone(),
            created_at: entry.created_at,
            categories,
            reaction_counts: aggregate.reaction_counts.clone(),
            my_reactions: my_votes.get(&aggregate.id).cloned().unwrap_or_default(),
            is_new: entry.is_new,
            source: entry.source,
        }
    }

    pub async fn mark_notifications_read(&self, viewer_id: Uuid) -> Result<u64, FeedError> {
        Ok(self.fanout.mark_notifications_read(viewer_id).await?)
    }

    pub async fn mark_feed_read(&self, viewer_id: Uuid) -> Result<u64, FeedError> {
        Ok(self.fanout.mark_feed_read(viewer_id).await?)
    }

    pub async fn hide_entry(&self, viewer_id: Uuid, aggregate_id: AggregateId) -> Result<bool, FeedError> {
        Ok(self.fanout.hide_entry(viewer_id, aggregate_id).await?)
    }

    pub async fn get_reaction_catalog(&self) -> Result<Vec<ReactionKind>, FeedError> {
        Ok(self.reactions.reaction_catalog().await?)
    }

    /// Records a vote. Voting twice with the same kind changes nothing.
    #[instrument(skip(self))]
    pub async fn vote_reaction(
        &self,
        voter_id: Uuid,
        aggregate_id: AggregateId,
        reaction_kind_id: ReactionKindId,
    ) -> Result<bool, FeedError> {
        self.ensure_kind(reaction_kind_id).await?;
        if self.aggregates.get_aggregate(aggregate_id).await?.is_none() {
            return Err(FeedError::AggregateNotFound(aggregate_id));
        }
        let vote = ReactionVote {
            id: Uuid::new_v4(),
            aggregate_id,
            voter_id,
            reaction_kind_id,
            created_at: Utc::now(),
        };
        let inserted = match self.reactions.insert_vote(&vote).await {
            Ok(inserted) => inserted,
            Err(RepositoryError::NotFound(_)) => return Err(FeedError::AggregateNotFound(aggregate_id)),
            Err(err) => return Err(err.into()),
        };
        if inserted {
            self.schedule_rollup(aggregate_id).await?;
        }
        Ok(inserted)
    }

    #[instrument(skip(self))]
    pub async fn unvote_reaction(
        &self,
        voter_id: Uuid,
        aggregate_id: AggregateId,
        reaction_kind_id: ReactionKindId,
    ) -> Result<bool, FeedError> {
        self.ensure_kind(reaction_kind_id).await?;
        let removed = self
            .reactions
            .delete_vote(aggregate_id, voter_id, reaction_kind_id)
            .await?;
        if removed {
            self.schedule_rollup(aggregate_id).await?;
        }
        Ok(removed)
    }

    async fn ensure_kind(&self, reaction_kind_id: ReactionKindId) -> Result<(), FeedError> {
        let catalog = self.reactions.reaction_catalog().await?;
        if catalog.iter().any(|kind| kind.id == reaction_kind_id) {
            Ok(())
        } else {
            Err(FeedError::UnknownReactionKind(reaction_kind_id))
        }
    }

    async fn schedule_rollup(&self, aggregate_id: AggregateId) -> Result<(), FeedError> {
        if let Some(tasks) = &self.tasks {
            match tasks.send(MaintenanceTask::RecomputeReactions(aggregate_id)).await {
                Ok(()) => return Ok(()),
                Err(_) => warn!(aggregate_id = %aggregate_id, "Maintenance channel closed, recomputing inline"),
            }
        }
        self.rollup.recompute(aggregate_id).await?;
        Ok(())
    }
}
