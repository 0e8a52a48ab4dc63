//! Orchestrator module for the feed engine.
//!
//! Coordinates the consumer and the feed engine: classifies every polled
//! event, partitions a batch into groups of events sharing an ordering key and
//! applies the partitions on a bounded worker pool, strictly in queue order
//! within each partition.
mod barriers;
mod engine;

pub use engine::{ApplyReport, FeedEngine};

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use feed_engine_repository::EventTransition;
use feed_engine_shared::types::{Event, EventId, EventOutcome, EventStatus};
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Duration, interval};
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::{ConsumeEvents, EventQueue, StreamMessage};
use crate::errors::OrchestratorError;
use crate::maintenance::MaintenanceTask;
use crate::processor::EventPlan;
use barriers::KeyBarriers;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size of the message channel buffer.
    pub channel_buffer_size: usize,
    /// Partitions and maintenance tasks running at once.
    pub workers: usize,
    pub progress_interval: Duration,
    /// Attempts for a maintenance task failing transiently.
    pub task_retries: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 16,
            workers: 8,
            progress_interval: Duration::from_secs(10),
            task_retries: 5,
        }
    }
}

/// Counters reported by the progress timer.
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub events_processed: AtomicU64,
    pub events_failed: AtomicU64,
    pub aggregates_touched: AtomicU64,
    pub milestones_fired: AtomicU64,
    pub tasks_run: AtomicU64,
}

impl ProcessingStats {
    fn record(&self, outcome: &EventOutcome, report: Option<&ApplyReport>) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        if matches!(outcome, EventOutcome::Transient(_) | EventOutcome::Permanent(_)) {
            self.events_failed.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(report) = report {
            self.aggregates_touched
                .fetch_add(report.aggregates_touched as u64, Ordering::Relaxed);
            self.milestones_fired
                .fetch_add(report.milestones_fired as u64, Ordering::Relaxed);
        }
    }
}

/// A classified event with the ordering keys of its plan.
struct Keyed {
    event: Event,
    plan: EventPlan,
    keys: Vec<String>,
}

/// Events of one batch connected through shared ordering keys, in queue
/// order.
#[derive(Default)]
struct Partition {
    keys: HashSet<String>,
    items: Vec<Keyed>,
}

impl Partition {
    fn shares_key(&self, keys: &[String]) -> bool {
        keys.iter().any(|key| self.keys.contains(key))
    }

    fn absorb(&mut self, other: Partition) {
        self.keys.extend(other.keys);
        self.items.extend(other.items);
    }
}

/// Groups classified events so that any two sharing an ordering key end up in
/// the same partition, keeping queue order inside each partition.
fn partition_batch(classified: Vec<(Event, EventPlan)>) -> Vec<Partition> {
    let mut partitions: Vec<Partition> = Vec::new();
    for (event, plan) in classified {
        let keys = plan.ordering_keys(&event);
        let overlapping: Vec<usize> = partitions
            .iter()
            .enumerate()
            .filter(|(_, partition)| partition.shares_key(&keys))
            .map(|(index, _)| index)
            .collect();

        let mut merged = Partition::default();
        for index in overlapping.into_iter().rev() {
            merged.absorb(partitions.remove(index));
        }
        merged.keys.extend(keys.iter().cloned());
        merged.items.push(Keyed { event, plan, keys });
        merged.items.sort_by_key(|keyed| keyed.event.id);
        partitions.push(merged);
    }
    partitions
}

/// Orchestrator that coordinates the consumer and the feed engine.
///
/// The orchestrator:
/// - Routes batches from the consumer to the worker pool and acknowledges them
/// - Keeps events with the same ordering key in queue order, across retries
/// - Runs maintenance tasks on the same pool
/// - Handles shutdown signals and reports progress
pub struct Orchestrator {
    consumer: Arc<dyn ConsumeEvents>,
    worker: PartitionWorker,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Option<mpsc::Receiver<MaintenanceTask>>,
    pool: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(consumer: Arc<dyn ConsumeEvents>, queue: Arc<EventQueue>, engine: Arc<FeedEngine>) -> Self {
        Self::with_config(consumer, queue, engine, OrchestratorConfig::default())
    }

    pub fn with_config(
        consumer: Arc<dyn ConsumeEvents>,
        queue: Arc<EventQueue>,
        engine: Arc<FeedEngine>,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let barriers = Arc::new(KeyBarriers::new(queue.config().lease));
        let workers = config.workers.max(1);

        Self {
            consumer,
            worker: PartitionWorker {
                queue,
                engine,
                barriers,
                stats: Arc::new(ProcessingStats::default()),
            },
            config,
            shutdown_tx,
            tasks: None,
            pool: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Maintenance tasks received here run on the worker pool alongside
    /// event partitions.
    pub fn with_tasks(mut self, tasks: mpsc::Receiver<MaintenanceTask>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn stats(&self) -> Arc<ProcessingStats> {
        Arc::clone(&self.worker.stats)
    }

    /// Run the orchestrator.
    ///
    /// Blocks until a shutdown signal is received or the consumer ends, then
    /// waits for in-flight maintenance tasks.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<(), OrchestratorError> {
        info!(workers = self.config.workers, "Starting feed engine orchestrator");

        let (event_transmitter, mut event_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);
        let (ack_transmitter, ack_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);

        let consumer = Arc::clone(&self.consumer);
        let consumer_shutdown = self.shutdown_tx.subscribe();
        let consumer_handle = tokio::spawn(async move {
            if let Err(e) = consumer
                .run(event_transmitter, ack_receiver, consumer_shutdown)
                .await
            {
                error!(error = %e, "Consumer error");
            }
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut tasks = self.tasks.take();

        let stats = self.stats();
        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut prev_events: u64 = 0;
        let mut prev_time = std::time::Instant::now();

        loop {
            tokio::select! {
                msg = event_receiver.recv() => {
                    match msg {
                        Some(StreamMessage::Events { events }) => {
                            let event_ids: Vec<EventId> = events.iter().map(|event| event.id).collect();
                            debug!(event_count = event_ids.len(), "Received events from consumer");
                            self.process_batch(events).await?;
                            let _ = ack_transmitter
                                .send(StreamMessage::Acknowledgment { event_ids })
                                .await;
                        }
                        Some(StreamMessage::Error(e)) => {
                            error!(error = %e, "Received error from consumer");
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Consumer stream ended");
                            break;
                        }
                        Some(StreamMessage::Acknowledgment { .. }) => {
                            warn!("Received acknowledgment on event channel (should be on ack channel)");
                        }
                    }
                }
                Some(task) = next_task(&mut tasks) => {
                    self.spawn_task(task).await?;
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = progress_timer.tick() => {
                    let events = stats.events_processed.load(Ordering::Relaxed);
                    let now = std::time::Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();
                    let events_per_sec = if elapsed_secs > 0.0 {
                        (events.saturating_sub(prev_events) as f64) / elapsed_secs
                    } else {
                        0.0
                    };

                    info!(
                        events_processed = events,
                        events_failed = stats.events_failed.load(Ordering::Relaxed),
                        aggregates_touched = stats.aggregates_touched.load(Ordering::Relaxed),
                        milestones_fired = stats.milestones_fired.load(Ordering::Relaxed),
                        events_per_sec = format!("{:.2}", events_per_sec),
                        "Processing progress"
                    );

                    prev_events = events;
                    prev_time = now;
                }
            }
        }

        let _ = self.shutdown_tx.send(());
        // Unblocks a consumer still trying to hand over a batch.
        drop(event_receiver);
        let _ = consumer_handle.await;

        // Every permit back in the pool means no task is still running.
        let workers = self.config.workers.max(1) as u32;
        let _ = self.pool.acquire_many(workers).await;

        info!(
            total_events_processed = stats.events_processed.load(Ordering::Relaxed),
            total_events_failed = stats.events_failed.load(Ordering::Relaxed),
            total_tasks_run = stats.tasks_run.load(Ordering::Relaxed),
            "Orchestrator shutdown complete"
        );
        Ok(())
    }

    /// Classifies a batch, then applies it partition by partition.
    ///
    /// Returns once every event of the batch has been acknowledged to the
    /// queue, or left started when the acknowledgment itself failed.
    async fn process_batch(&self, events: Vec<Event>) -> Result<(), OrchestratorError> {
        let mut classified = Vec::with_capacity(events.len());
        for event in events {
            match self.worker.engine.classify(&event) {
                Ok(Some(plan)) => classified.push((event, plan)),
                Ok(None) => {
                    self.worker.settle(&event, EventOutcome::Empty, None).await;
                }
                Err(err) => {
                    warn!(event_id = event.id, error = %err, "Rejecting malformed event");
                    self.worker
                        .settle(&event, EventOutcome::Permanent(err.to_string()), None)
                        .await;
                }
            }
        }

        let partitions = partition_batch(classified);
        debug!(partitions = partitions.len(), "Dispatching partitions");
        let mut running = JoinSet::new();
        for partition in partitions {
            let permit = Arc::clone(&self.pool)
                .acquire_owned()
                .await
                .map_err(|_| OrchestratorError::WorkerPoolClosed)?;
            let worker = self.worker.clone();
            running.spawn(async move {
                let _permit = permit;
                worker.run_partition(partition).await;
            });
        }
        while let Some(joined) = running.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Partition worker panicked");
            }
        }
        Ok(())
    }

    async fn spawn_task(&self, task: MaintenanceTask) -> Result<(), OrchestratorError> {
        let permit = Arc::clone(&self.pool)
            .acquire_owned()
            .await
            .map_err(|_| OrchestratorError::WorkerPoolClosed)?;
        let engine = Arc::clone(&self.worker.engine);
        let stats = Arc::clone(&self.worker.stats);
        let retries = self.config.task_retries;

        tokio::spawn(async move {
            let _permit = permit;
            let strategy = ExponentialBackoff::from_millis(10)
                .factor(2)
                .max_delay(Duration::from_secs(5))
                .map(jitter)
                .take(retries);
            let result = RetryIf::spawn(
                strategy,
                || engine.run_task(&task),
                |err: &OrchestratorError| err.is_transient(),
            )
            .await;
            match result {
                Ok(()) => {
                    stats.tasks_run.fetch_add(1, Ordering::Relaxed);
                    debug!(task = ?task, "Maintenance task done");
                }
                Err(err) => engine::log_task_failure(&task, &err),
            }
        });
        Ok(())
    }

    /// Get a handle that stops [`Orchestrator::run`] when sent to.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn next_task(tasks: &mut Option<mpsc::Receiver<MaintenanceTask>>) -> Option<MaintenanceTask> {
    match tasks {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Everything a partition needs, cloned into each worker task.
#[derive(Clone)]
struct PartitionWorker {
    queue: Arc<EventQueue>,
    engine: Arc<FeedEngine>,
    barriers: Arc<KeyBarriers>,
    stats: Arc<ProcessingStats>,
}

impl PartitionWorker {
    async fn run_partition(&self, partition: Partition) {
        let partition_keys: Vec<String> = partition.keys.into_iter().collect();
        let ids: Vec<EventId> = partition.items.iter().map(|keyed| keyed.event.id).collect();
        let mut deferred_until = self.barriers.blocking(&partition_keys, &ids, Utc::now());

        for Keyed { event, plan, keys } in partition.items {
            if let Some(until) = deferred_until {
                debug!(event_id = event.id, %until, "Deferring behind an earlier event");
                if self.queue.ack(&event, &EventOutcome::Deferred(until)).await.is_err() {
                    warn!(event_id = event.id, "Failed to defer event, leaving it to the lease");
                }
                continue;
            }

            let result = self.engine.apply(&event, &plan).await;
            let outcome = FeedEngine::outcome(&plan, &result);
            if let Err(err) = &result {
                warn!(event_id = event.id, error = %err, "Failed to apply event");
            }

            match self.settle(&event, outcome, result.as_ref().ok()).await {
                Some(transition) if transition.status == EventStatus::Delayed => {
                    let until = transition.scheduled_at.unwrap_or_else(Utc::now);
                    self.barriers.block(&keys, event.id, until);
                    deferred_until = Some(until);
                }
                Some(_) => self.barriers.release(&keys, event.id),
                // The event stays started until its lease runs out, and the
                // rest of the partition must not overtake it.
                None => break,
            }
        }
    }

    async fn settle(
        &self,
        event: &Event,
        outcome: EventOutcome,
        report: Option<&ApplyReport>,
    ) -> Option<EventTransition> {
        self.stats.record(&outcome, report);
        match self.queue.ack(event, &outcome).await {
            Ok(transition) => Some(transition),
            Err(err) => {
                error!(event_id = event.id, error = %err, "Failed to acknowledge event");
                None
            }
        }
    }
}
