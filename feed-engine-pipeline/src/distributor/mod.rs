//! Fan-out of aggregates to personal feeds and notification inboxes.
//!
//! Distribution is a snapshot of the follower set at the time the aggregate
//! was created or updated. Every write is an idempotent upsert keyed by
//! `(aggregate, recipient)`, so distributing the same aggregate again after a
//! crash or a retry never duplicates an entry.
use std::sync::Arc;

use feed_engine_repository::{AggregateRepository, FanoutRepository, RepositoryError};
use feed_engine_shared::types::{Aggregate, Audience, EntityRef};
use futures::future::try_join_all;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::capabilities::FollowerLookup;
use crate::errors::DistributorError;

#[derive(Debug, Clone)]
pub struct DistributorConfig {
    /// Followers requested per lookup page.
    pub page_size: usize,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self { page_size: 500 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributionSummary {
    pub fanout_inserted: u64,
    pub notifications_inserted: u64,
    pub recipients_seen: usize,
}

impl DistributionSummary {
    fn absorb(&mut self, other: DistributionSummary) {
        self.fanout_inserted += other.fanout_inserted;
        self.notifications_inserted += other.notifications_inserted;
        self.recipients_seen += other.recipients_seen;
    }
}

pub struct FanoutDistributor {
    fanout: Arc<dyn FanoutRepository>,
    aggregates: Arc<dyn AggregateRepository>,
    followers: Arc<dyn FollowerLookup>,
    config: DistributorConfig,
}

impl FanoutDistributor {
    pub fn new(
        fanout: Arc<dyn FanoutRepository>,
        aggregates: Arc<dyn AggregateRepository>,
        followers: Arc<dyn FollowerLookup>,
        config: DistributorConfig,
    ) -> Self {
        Self {
            fanout,
            aggregates,
            followers,
            config,
        }
    }

    /// Replicates an aggregate to its audience.
    ///
    /// An aggregate deleted while distribution is under way is not an error;
    /// the remaining writes are skipped.
    #[instrument(skip(self, aggregate), fields(aggregate_id = %aggregate.id, action = %aggregate.action))]
    pub async fn distribute(&self, aggregate: &Aggregate) -> Result<DistributionSummary, DistributorError> {
        let result = match aggregate.action.audience() {
            Audience::Followers => self.to_owner_followers(aggregate).await,
            Audience::Recipient => self.to_recipient(aggregate).await,
            Audience::Community => self.to_community(aggregate).await,
        };
        match result {
            Err(DistributorError::Repository(RepositoryError::NotFound(reason))) => {
                debug!(reason = %reason, "Aggregate vanished during distribution");
                Ok(DistributionSummary::default())
            }
            Ok(summary) => {
                debug!(
                    fanout_inserted = summary.fanout_inserted,
                    notifications_inserted = summary.notifications_inserted,
                    recipients_seen = summary.recipients_seen,
                    "Distributed aggregate"
                );
                Ok(summary)
            }
            Err(err) => Err(err),
        }
    }

    /// The owner's own feed plus every current follower of the owner.
    async fn to_owner_followers(&self, aggregate: &Aggregate) -> Result<DistributionSummary, DistributorError> {
        let Some(owner) = aggregate.owner_id else {
            return Ok(DistributionSummary::default());
        };
        let mut summary = DistributionSummary {
            fanout_inserted: self
                .fanout
                .upsert_fanout(aggregate.id, &[owner], aggregate.updated_at)
                .await?,
            recipients_seen: 1,
            ..DistributionSummary::default()
        };
        summary.absorb(self.to_followers_of(aggregate, EntityRef::user(owner)).await?);
        Ok(summary)
    }

    async fn to_recipient(&self, aggregate: &Aggregate) -> Result<DistributionSummary, DistributorError> {
        let Some(recipient) = aggregate.owner_id else {
            return Ok(DistributionSummary::default());
        };
        let inserted = self
            .fanout
            .upsert_notification(aggregate.id, recipient, aggregate.updated_at)
            .await?;
        Ok(DistributionSummary {
            notifications_inserted: u64::from(inserted),
            recipients_seen: 1,
            ..DistributionSummary::default()
        })
    }

    /// Followers of every entity the aggregate references, looked up
    /// concurrently.
    async fn to_community(&self, aggregate: &Aggregate) -> Result<DistributionSummary, DistributorError> {
        let targets = aggregate.referenced_entities();
        let summaries = try_join_all(
            targets
                .into_iter()
                .map(|target| self.to_followers_of(aggregate, target)),
        )
        .await?;
        let mut total = DistributionSummary::default();
        for summary in summaries {
            total.absorb(summary);
        }
        Ok(total)
    }

    async fn to_followers_of(
        &self,
        aggregate: &Aggregate,
        target: EntityRef,
    ) -> Result<DistributionSummary, DistributorError> {
        let mut summary = DistributionSummary::default();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .followers
                .followers(&target, cursor.as_deref(), self.config.page_size)
                .await?;
            if !page.follower_ids.is_empty() {
                summary.recipients_seen += page.follower_ids.len();
                summary.fanout_inserted += self
                    .fanout
                    .upsert_fanout(aggregate.id, &page.follower_ids, aggregate.updated_at)
                    .await?;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(summary)
    }

    /// Gives a new follower the most recent aggregates of the user they
    /// started following. Never runs as part of normal distribution.
    #[instrument(skip(self))]
    pub async fn backfill_follower(
        &self,
        follower_id: Uuid,
        target_id: Uuid,
        limit: usize,
    ) -> Result<u64, DistributorError> {
        let recent = self.aggregates.aggregates_owned_by(target_id, limit).await?;
        let mut inserted = 0;
        for aggregate in recent
            .iter()
            .filter(|aggregate| aggregate.action.audience() == Audience::Followers)
        {
            match self
                .fanout
                .upsert_fanout(aggregate.id, &[follower_id], aggregate.updated_at)
                .await
            {
                Ok(count) => inserted += count,
                Err(RepositoryError::NotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        info!(inserted, "Backfilled follower");
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::StaticFollowerLookup;
    use chrono::Utc;
    use feed_engine_repository::MemoryFeedStore;
    use feed_engine_shared::types::{AggregateAction, CategoryName, GroupingKey};

    struct Fixture {
        store: Arc<MemoryFeedStore>,
        followers: Arc<StaticFollowerLookup>,
        distributor: FanoutDistributor,
    }

    fn fixture(page_size: usize) -> Fixture {
        let store = Arc::new(MemoryFeedStore::new());
        let followers = Arc::new(StaticFollowerLookup::new());
        let distributor = FanoutDistributor::new(
            store.clone(),
            store.clone(),
            followers.clone(),
            DistributorConfig { page_size },
        );
        Fixture {
            store,
            followers,
            distributor,
        }
    }

    async fn stored(
        store: &MemoryFeedStore,
        action: AggregateAction,
        owner: Option<Uuid>,
        category: CategoryName,
        ids: &[Uuid],
    ) -> Aggregate {
        let mut aggregate = Aggregate::new(&GroupingKey::new(action, owner), 0, 1, Utc::now());
        for id in ids {
            aggregate.append(category, *id, None).unwrap();
        }
        store.insert_aggregate(&aggregate).await.unwrap();
        aggregate
    }

    #[tokio::test]
    async fn test_followers_audience_includes_owner_and_every_page() {
        let fx = fixture(2);
        let owner = Uuid::new_v4();
        let followers: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for follower in &followers {
            fx.followers.add_follower(EntityRef::user(owner), *follower);
        }
        let aggregate = stored(
            &fx.store,
            AggregateAction::ReviewPosted,
            Some(owner),
            CategoryName::Reviews,
            &[Uuid::new_v4()],
        )
        .await;

        let summary = fx.distributor.distribute(&aggregate).await.unwrap();
        assert_eq!(summary.fanout_inserted, 6);

        let entries = fx.store.fanout_entries_for(aggregate.id).await.unwrap();
        assert_eq!(entries.len(), 6);
        assert!(entries.iter().all(|entry| entry.is_new));
        assert!(entries.iter().any(|entry| entry.follower_id == owner));
    }

    #[tokio::test]
    async fn test_distributing_twice_does_not_duplicate() {
        let fx = fixture(100);
        let owner = Uuid::new_v4();
        fx.followers.add_follower(EntityRef::user(owner), Uuid::new_v4());
        let aggregate = stored(
            &fx.store,
            AggregateAction::UserFollowed,
            Some(owner),
            CategoryName::Users,
            &[Uuid::new_v4()],
        )
        .await;

        fx.distributor.distribute(&aggregate).await.unwrap();
        let again = fx.distributor.distribute(&aggregate).await.unwrap();
        assert_eq!(again.fanout_inserted, 0);
        assert_eq!(fx.store.fanout_entries_for(aggregate.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_recipient_audience_writes_one_notification() {
        let fx = fixture(100);
        let followee = Uuid::new_v4();
        fx.followers.add_follower(EntityRef::user(followee), Uuid::new_v4());
        let aggregate = stored(
            &fx.store,
            AggregateAction::NewFollower,
            Some(followee),
            CategoryName::Users,
            &[Uuid::new_v4()],
        )
        .await;

        let summary = fx.distributor.distribute(&aggregate).await.unwrap();
        assert_eq!(summary.notifications_inserted, 1);
        assert_eq!(summary.fanout_inserted, 0);
        let notifications = fx.store.notification_entries_for(aggregate.id).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].recipient_id, followee);
    }

    #[tokio::test]
    async fn test_community_audience_reaches_followers_of_each_entity() {
        let fx = fixture(100);
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let shared_follower = Uuid::new_v4();
        fx.followers.add_follower(EntityRef::game(first), shared_follower);
        fx.followers.add_follower(EntityRef::game(first), Uuid::new_v4());
        fx.followers.add_follower(EntityRef::game(second), shared_follower);
        let aggregate = stored(
            &fx.store,
            AggregateAction::CommunityGamePopular,
            None,
            CategoryName::Games,
            &[first, second],
        )
        .await;

        let summary = fx.distributor.distribute(&aggregate).await.unwrap();
        assert_eq!(summary.recipients_seen, 3);
        assert_eq!(summary.fanout_inserted, 2);
    }

    #[tokio::test]
    async fn test_later_followers_only_arrive_through_backfill() {
        let fx = fixture(100);
        let owner = Uuid::new_v4();
        let aggregate = stored(
            &fx.store,
            AggregateAction::ReviewPosted,
            Some(owner),
            CategoryName::Reviews,
            &[Uuid::new_v4()],
        )
        .await;
        fx.distributor.distribute(&aggregate).await.unwrap();

        let newcomer = Uuid::new_v4();
        fx.followers.add_follower(EntityRef::user(owner), newcomer);
        let feed = fx.store.feed_entries(newcomer, None, 10).await.unwrap();
        assert!(feed.is_empty());

        assert_eq!(fx.distributor.backfill_follower(newcomer, owner, 10).await.unwrap(), 1);
        let feed = fx.store.feed_entries(newcomer, None, 10).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].aggregate_id, aggregate.id);
    }

    #[tokio::test]
    async fn test_deleted_aggregate_is_skipped() {
        let fx = fixture(100);
        let owner = Uuid::new_v4();
        let aggregate = stored(
            &fx.store,
            AggregateAction::ReviewPosted,
            Some(owner),
            CategoryName::Reviews,
            &[Uuid::new_v4()],
        )
        .await;
        fx.store.delete_aggregate(aggregate.id).await.unwrap();

        let summary = fx.distributor.distribute(&aggregate).await.unwrap();
        assert_eq!(summary, DistributionSummary::default());
    }
}
