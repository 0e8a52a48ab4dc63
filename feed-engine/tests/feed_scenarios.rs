//! End-to-end feed scenarios over the in-memory store.
//!
//! Events are enqueued the way domain hooks would, then drained through the
//! same engine the orchestrator drives.

use std::sync::Arc;
use std::time::Duration;

use feed_engine::{Dependencies, Settings};
use feed_engine::config::StorageBackend;
use feed_engine_pipeline::capabilities::{StaticEntityResolver, StaticFollowerLookup};
use feed_engine_repository::{EventQueueRepository, FanoutRepository, MemoryFeedStore};
use feed_engine_shared::types::{
    Aggregate, AggregateAction, CategoryName, EntityRef, EntityType, EventId, EventStatus, NewEvent,
};
use serde_json::json;
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryFeedStore>,
    followers: Arc<StaticFollowerLookup>,
    resolver: Arc<StaticEntityResolver>,
    deps: Dependencies,
}

fn harness(settings: Settings) -> Harness {
    let store = Arc::new(MemoryFeedStore::new());
    let followers = Arc::new(StaticFollowerLookup::new());
    let resolver = Arc::new(StaticEntityResolver::new());
    let deps = Dependencies::assemble(store.clone(), followers.clone(), resolver.clone(), &settings);
    Harness {
        store,
        followers,
        resolver,
        deps,
    }
}

fn memory_settings() -> Settings {
    Settings {
        storage: StorageBackend::Memory,
        ..Settings::default()
    }
}

impl Harness {
    async fn enqueue(&self, event: NewEvent) -> EventId {
        self.deps.queue.enqueue(&event).await.unwrap()
    }

    /// Processes everything due, including events emitted while draining.
    async fn drain(&self) {
        loop {
            let events = self.deps.queue.poll().await.unwrap();
            if events.is_empty() {
                return;
            }
            for event in events {
                let outcome = self.deps.engine.handle(&event).await;
                self.deps.queue.ack(&event, &outcome).await.unwrap();
            }
        }
    }

    async fn status(&self, id: EventId) -> EventStatus {
        self.store.get_event(id).await.unwrap().unwrap().status
    }

    fn aggregates_of(&self, action: AggregateAction) -> Vec<Aggregate> {
        self.store
            .aggregates()
            .into_iter()
            .filter(|aggregate| aggregate.action == action)
            .collect()
    }

    /// Registers a review with the resolver and returns its posting event.
    fn review(&self, author: Uuid) -> (Uuid, NewEvent) {
        let id = Uuid::new_v4();
        self.resolver.insert(EntityRef::review(id), json!({ "id": id }));
        let event = NewEvent::addition(EntityType::Review, id)
            .with_actor(author)
            .with_extra(json!({ "has_text": true }));
        (id, event)
    }
}

fn mark_game(user: Uuid, game: Uuid, status: &str) -> NewEvent {
    NewEvent::addition(EntityType::Game, game)
        .with_actor(user)
        .with_extra(json!({ "status": status }))
}

fn follow(follower: Uuid, followee: Uuid, before: i64) -> NewEvent {
    NewEvent::addition(EntityType::Follow, Uuid::new_v4())
        .with_actor(follower)
        .with_extra(json!({
            "followee_id": followee,
            "followers_before": before,
            "followers_after": before + 1,
        }))
}

#[tokio::test]
async fn test_reviews_merge_and_reach_the_authors_followers() {
    let h = harness(memory_settings());
    let (author, follower) = (Uuid::new_v4(), Uuid::new_v4());
    h.followers.add_follower(EntityRef::user(author), follower);

    for _ in 0..3 {
        let (_, event) = h.review(author);
        h.enqueue(event).await;
    }
    h.drain().await;

    let aggregates = h.aggregates_of(AggregateAction::ReviewPosted);
    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0].categories[&CategoryName::Reviews].total(), 3);

    let fanout = h.store.fanout_entries_for(aggregates[0].id).await.unwrap();
    assert_eq!(fanout.len(), 2);

    let page = h.deps.feed.list_feed(follower, None, 10).await.unwrap();
    assert_eq!(page.items.len(), 1);
    let reviews = &page.items[0].categories[0];
    assert_eq!(reviews.total, 3);
    assert_eq!(reviews.displayed.len(), 3);
}

#[tokio::test]
async fn test_redelivered_event_changes_nothing() {
    let h = harness(memory_settings());
    let author = Uuid::new_v4();
    let (_, event) = h.review(author);
    h.enqueue(event).await;

    let events = h.deps.queue.poll().await.unwrap();
    for _ in 0..2 {
        h.deps.engine.handle(&events[0]).await;
    }

    let aggregates = h.store.aggregates();
    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0].categories[&CategoryName::Reviews].total(), 1);
    assert_eq!(h.store.fanout_entries_for(aggregates[0].id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unmarked_games_are_stripped_and_empty_aggregates_deleted() {
    let h = harness(memory_settings());
    let user = Uuid::new_v4();
    let games: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    for game in &games {
        h.enqueue(mark_game(user, *game, "playing")).await;
    }
    h.drain().await;

    let aggregate = &h.aggregates_of(AggregateAction::GameStatus)[0];
    assert_eq!(aggregate.categories[&CategoryName::Games].ids(), games.as_slice());

    h.enqueue(NewEvent::deletion(EntityType::Game, games[1]).with_actor(user))
        .await;
    h.drain().await;
    let aggregate = &h.aggregates_of(AggregateAction::GameStatus)[0];
    assert_eq!(aggregate.categories[&CategoryName::Games].ids(), &[games[0], games[2]]);
    let aggregate_id = aggregate.id;

    for game in [games[0], games[2]] {
        h.enqueue(NewEvent::deletion(EntityType::Game, game).with_actor(user))
            .await;
    }
    h.drain().await;
    assert!(h.aggregates_of(AggregateAction::GameStatus).is_empty());
    assert!(h.store.fanout_entries_for(aggregate_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unmarking_only_touches_the_actors_aggregates() {
    let h = harness(memory_settings());
    let (alice, bob, game) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    h.enqueue(mark_game(alice, game, "owned")).await;
    h.enqueue(mark_game(bob, game, "owned")).await;
    h.drain().await;

    h.enqueue(NewEvent::deletion(EntityType::Game, game).with_actor(alice))
        .await;
    h.drain().await;

    let remaining = h.aggregates_of(AggregateAction::GameStatus);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].owner_id, Some(bob));
}

#[tokio::test]
async fn test_deleted_user_disappears_from_every_feed() {
    let h = harness(memory_settings());
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    h.enqueue(follow(alice, bob, 0)).await;
    let (_, review) = h.review(alice);
    h.enqueue(review).await;
    h.drain().await;

    assert_eq!(h.aggregates_of(AggregateAction::NewFollower).len(), 1);
    assert_eq!(h.store.aggregates().len(), 3);

    let deleted = h.enqueue(NewEvent::deletion(EntityType::User, alice)).await;
    h.drain().await;

    assert_eq!(h.status(deleted).await, EventStatus::Finished);
    assert!(h.store.aggregates().is_empty());
}

#[tokio::test]
async fn test_popular_game_fires_exactly_once() {
    let mut settings = memory_settings();
    settings.threshold.game_owned_count = 3;
    let h = harness(settings);
    let game = Uuid::new_v4();

    for _ in 0..8 {
        h.enqueue(mark_game(Uuid::new_v4(), game, "owned")).await;
    }
    h.drain().await;

    assert_eq!(h.store.mark_count(), 1);
    let milestones: Vec<_> = h
        .store
        .events()
        .into_iter()
        .filter(|event| event.entity_type == EntityType::Milestone)
        .collect();
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].status, EventStatus::Finished);

    let community = h.aggregates_of(AggregateAction::CommunityGamePopular);
    assert_eq!(community.len(), 1);
    assert_eq!(community[0].owner_id, None);
    assert!(community[0].contains(CategoryName::Games, &game));
}

#[tokio::test]
async fn test_follower_milestone_survives_unfollow_and_refollow() {
    let mut settings = memory_settings();
    settings.threshold.user_followers = 2;
    let h = harness(settings);
    let (star, first, second) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    h.enqueue(follow(first, star, 0)).await;
    h.enqueue(follow(second, star, 1)).await;
    h.drain().await;
    assert_eq!(h.store.mark_count(), 1);

    h.enqueue(
        NewEvent::deletion(EntityType::Follow, Uuid::new_v4())
            .with_actor(second)
            .with_extra(json!({ "followee_id": star })),
    )
    .await;
    h.enqueue(follow(second, star, 1)).await;
    h.drain().await;

    assert_eq!(h.store.mark_count(), 1);
    assert_eq!(h.aggregates_of(AggregateAction::CommunityUserPopular).len(), 1);
}

#[tokio::test]
async fn test_below_threshold_like_is_empty() {
    let h = harness(memory_settings());
    let like = h
        .enqueue(
            NewEvent::addition(EntityType::ReviewLike, Uuid::new_v4()).with_extra(json!({
                "review_id": Uuid::new_v4(),
                "likes_before": 3,
                "likes_after": 4,
            })),
        )
        .await;
    h.drain().await;

    assert_eq!(h.status(like).await, EventStatus::Empty);
    assert_eq!(h.store.mark_count(), 0);
}

#[tokio::test]
async fn test_collection_posts_follow_their_join_rows() {
    let h = harness(memory_settings());
    let (owner, collection) = (Uuid::new_v4(), Uuid::new_v4());
    let added = |size: i64| {
        NewEvent::addition(EntityType::CollectionGame, Uuid::new_v4())
            .with_actor(owner)
            .with_extra(json!({
                "collection_id": collection,
                "game_id": Uuid::new_v4(),
                "collection_size": size,
            }))
    };

    let too_small = h.enqueue(added(2)).await;
    let first = added(6);
    let first_row = first.entity_id;
    h.enqueue(first).await;
    h.enqueue(added(7)).await;
    h.drain().await;

    assert_eq!(h.status(too_small).await, EventStatus::Empty);
    assert_eq!(h.aggregates_of(AggregateAction::CollectionGameAdded).len(), 2);

    h.enqueue(NewEvent::deletion(EntityType::CollectionGame, first_row))
        .await;
    h.drain().await;

    let remaining = h.aggregates_of(AggregateAction::CollectionGameAdded);
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].anchor, Some(EntityRef::new(EntityType::CollectionGame, first_row)));
}

#[tokio::test]
async fn test_malformed_event_ends_in_error_without_retries() {
    let h = harness(memory_settings());
    let id = h
        .enqueue(NewEvent::addition(EntityType::Follow, Uuid::new_v4()).with_actor(Uuid::new_v4()))
        .await;
    h.drain().await;

    let event = h.store.get_event(id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Error);
    assert_eq!(event.retry_count, 0);
    assert_eq!(h.deps.queue.failed_events(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_language_change_retags_existing_aggregates() {
    let h = harness(memory_settings());
    let author = Uuid::new_v4();
    let (_, review) = h.review(author);
    h.enqueue(review).await;
    h.enqueue(mark_game(author, Uuid::new_v4(), "beaten")).await;
    h.drain().await;

    h.enqueue(NewEvent::language_change(EntityType::User, author).with_extra(json!({ "language": "pt" })))
        .await;
    h.drain().await;

    let aggregates = h.store.aggregates();
    assert_eq!(aggregates.len(), 2);
    assert!(
        aggregates
            .iter()
            .all(|aggregate| aggregate.language.as_deref() == Some("pt"))
    );
}

#[tokio::test]
async fn test_feed_shows_half_the_display_limit_per_category() {
    let mut settings = memory_settings();
    settings.feed.display_limit = 4;
    let h = harness(settings);
    let author = Uuid::new_v4();

    let mut reviews = Vec::new();
    for _ in 0..5 {
        let (id, event) = h.review(author);
        reviews.push(id);
        h.enqueue(event).await;
    }
    h.drain().await;

    let page = h.deps.feed.list_feed(author, None, 10).await.unwrap();
    let category = &page.items[0].categories[0];
    assert_eq!(category.total, 5);
    assert_eq!(category.displayed.len(), 2);
    assert_eq!(category.displayed[0]["id"], json!(reviews[4]));
    assert_eq!(category.displayed[1]["id"], json!(reviews[3]));
}

#[tokio::test]
async fn test_grouped_games_show_half_the_display_limit() {
    let mut settings = memory_settings();
    settings.feed.display_limit = 4;
    let h = harness(settings);
    let user = Uuid::new_v4();

    let mut games = Vec::new();
    for _ in 0..4 {
        let game = Uuid::new_v4();
        h.resolver.insert(EntityRef::game(game), json!({ "id": game }));
        games.push(game);
        h.enqueue(mark_game(user, game, "beaten")).await;
    }
    h.drain().await;

    let page = h.deps.feed.list_feed(user, None, 10).await.unwrap();
    assert_eq!(page.items.len(), 1);
    let category = &page.items[0].categories[0];
    assert_eq!(category.name, CategoryName::Games);
    assert_eq!(category.total, 4);
    assert_eq!(category.groups.get("beaten"), Some(&4));
    assert_eq!(category.displayed.len(), 2);
    assert_eq!(category.displayed[0]["id"], json!(games[3]));
    assert_eq!(category.displayed[1]["id"], json!(games[2]));
}

#[tokio::test]
async fn test_reactions_roll_up_on_the_orchestrator_pool() {
    let mut settings = memory_settings();
    settings.queue.idle_interval = Duration::from_millis(5);
    let Harness {
        store,
        resolver,
        deps,
        ..
    } = harness(settings);
    let Dependencies {
        mut orchestrator,
        queue,
        feed,
        ..
    } = deps;

    let (author, voter) = (Uuid::new_v4(), Uuid::new_v4());
    let review = Uuid::new_v4();
    resolver.insert(EntityRef::review(review), json!({ "id": review }));
    queue
        .enqueue(
            &NewEvent::addition(EntityType::Review, review)
                .with_actor(author)
                .with_extra(json!({ "has_text": true })),
        )
        .await
        .unwrap();

    let shutdown = orchestrator.shutdown_handle();
    let running = tokio::spawn(async move { orchestrator.run().await });

    let mut aggregate_id = None;
    for _ in 0..200 {
        if let Some(aggregate) = store.aggregates().first() {
            aggregate_id = Some(aggregate.id);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let aggregate_id = aggregate_id.unwrap();

    assert!(feed.vote_reaction(author, aggregate_id, 1).await.unwrap());
    assert!(!feed.vote_reaction(author, aggregate_id, 1).await.unwrap());
    assert!(feed.vote_reaction(voter, aggregate_id, 1).await.unwrap());

    let mut rolled_up = false;
    for _ in 0..200 {
        let counts = store.aggregates()[0].reaction_counts.clone();
        if counts.get(&1) == Some(&2) {
            rolled_up = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.send(()).unwrap();
    running.await.unwrap().unwrap();
    assert!(rolled_up);

    let page = feed.list_feed(author, None, 10).await.unwrap();
    assert_eq!(page.items[0].reaction_counts.get(&1), Some(&2));
    assert_eq!(page.items[0].my_reactions, vec![1]);
}
