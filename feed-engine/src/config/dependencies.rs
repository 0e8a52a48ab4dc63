//! Dependency initialization and wiring for the feed engine.

use std::sync::Arc;
use std::time::Duration;

use feed_engine_pipeline::aggregator::Aggregator;
use feed_engine_pipeline::capabilities::{DomainSource, EntityResolver, FollowerLookup};
use feed_engine_pipeline::consumer::{EventConsumer, EventQueue};
use feed_engine_pipeline::distributor::{DistributorConfig, FanoutDistributor};
use feed_engine_pipeline::feed::FeedService;
use feed_engine_pipeline::maintenance::{MaintenanceConfig, MaintenanceTask, ReactionRollup, ReverseMaintainer};
use feed_engine_pipeline::orchestrator::{FeedEngine, Orchestrator};
use feed_engine_pipeline::threshold::ThresholdDetector;
use feed_engine_repository::{FeedStore, MemoryFeedStore, PostgresFeedStore};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::handlers::register_handlers;
use crate::config::settings::{ConnectionMode, Settings, StorageBackend};
use crate::errors::IndexingError;

/// Pending maintenance tasks held before the feed service blocks.
const TASK_CHANNEL_SIZE: usize = 1024;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
    pub engine: Arc<FeedEngine>,
    pub queue: Arc<EventQueue>,
    /// Read and write API over the feeds, scheduling rollups on the
    /// orchestrator's pool.
    pub feed: Arc<FeedService>,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`Settings::from_env`] for the variables read.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If the database is unreachable in fail-fast
    ///   mode, or migrations fail
    pub async fn new() -> Result<Self, IndexingError> {
        Self::from_settings(Settings::from_env()).await
    }

    pub async fn from_settings(settings: Settings) -> Result<Self, IndexingError> {
        let (followers, resolver) = match &settings.domain_api_url {
            Some(url) => DomainSource::live(url.clone()).into_capabilities(),
            None => {
                warn!("DOMAIN_API_URL not set, using empty static follower and entity data");
                DomainSource::Static.into_capabilities()
            }
        };

        info!(
            storage = ?settings.storage,
            domain_api_url = ?settings.domain_api_url,
            workers = settings.orchestrator.workers,
            connection_mode = ?settings.database.connection_mode,
            "Initializing dependencies"
        );

        match settings.storage {
            StorageBackend::Memory => {
                warn!("Using in-memory storage, nothing survives a restart");
                Ok(Self::assemble(
                    Arc::new(MemoryFeedStore::new()),
                    followers,
                    resolver,
                    &settings,
                ))
            }
            StorageBackend::Postgres => {
                let url = settings
                    .database
                    .url
                    .clone()
                    .ok_or_else(|| IndexingError::config("DATABASE_URL must be set for the postgres backend"))?;
                let store = Self::connect_to_postgres(
                    &url,
                    settings.database.max_connections,
                    settings.database.connection_mode,
                    settings.database.retry_interval,
                )
                .await?;
                store.migrate().await?;
                info!("PostgreSQL connection established");

                Ok(Self::assemble(Arc::new(store), followers, resolver, &settings))
            }
        }
    }

    /// Wires every component over one store.
    pub fn assemble<S>(
        store: Arc<S>,
        followers: Arc<dyn FollowerLookup>,
        resolver: Arc<dyn EntityResolver>,
        settings: &Settings,
    ) -> Self
    where
        S: FeedStore + 'static,
    {
        let queue = Arc::new(EventQueue::new(store.clone(), settings.queue.clone()));
        let rollup = Arc::new(ReactionRollup::new(store.clone(), store.clone()));

        let engine = Arc::new(FeedEngine::new(
            Arc::new(register_handlers(settings)),
            Arc::new(Aggregator::new(store.clone(), settings.aggregator.clone())),
            Arc::new(ThresholdDetector::new(store.clone(), settings.threshold.clone())),
            Arc::new(FanoutDistributor::new(
                store.clone(),
                store.clone(),
                followers,
                DistributorConfig::default(),
            )),
            Arc::new(ReverseMaintainer::new(store.clone(), MaintenanceConfig::default())),
            rollup.clone(),
        ));

        let (task_sender, task_receiver) = mpsc::channel::<MaintenanceTask>(TASK_CHANNEL_SIZE);
        let feed = Arc::new(
            FeedService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                resolver,
                rollup,
                settings.feed.clone(),
            )
            .with_task_sender(task_sender),
        );

        let consumer = Arc::new(EventConsumer::new(queue.clone()));
        let orchestrator = Orchestrator::with_config(
            consumer,
            queue.clone(),
            engine.clone(),
            settings.orchestrator.clone(),
        )
        .with_tasks(task_receiver);

        Self {
            orchestrator,
            engine,
            queue,
            feed,
        }
    }

    /// Connect to PostgreSQL with retry logic based on connection mode.
    async fn connect_to_postgres(
        url: &str,
        max_connections: u32,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<PostgresFeedStore, IndexingError> {
        loop {
            match PostgresFeedStore::connect(url, max_connections).await {
                Ok(store) => return Ok(store),
                Err(e) => match mode {
                    ConnectionMode::FailFast => return Err(e.into()),
                    ConnectionMode::Retry => {
                        warn!(
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to PostgreSQL, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_engine_pipeline::errors::FeedError;

    #[tokio::test]
    async fn test_postgres_backend_requires_a_database_url() {
        let settings = Settings::default();
        let result = Dependencies::from_settings(settings).await;
        assert!(matches!(result, Err(IndexingError::Config(_))));
    }

    #[tokio::test]
    async fn test_memory_backend_wires_a_working_feed() {
        let settings = Settings {
            storage: StorageBackend::Memory,
            ..Settings::default()
        };
        let deps = Dependencies::from_settings(settings).await.unwrap();

        let catalog = deps.feed.get_reaction_catalog().await.unwrap();
        assert!(!catalog.is_empty());
        let err = deps
            .feed
            .vote_reaction(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), catalog[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::AggregateNotFound(_)));
    }
}
