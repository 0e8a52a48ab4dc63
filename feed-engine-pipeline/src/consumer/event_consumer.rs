use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::{EventQueue, StreamMessage};
use crate::errors::ConsumerError;

/// A source of event batches for the orchestrator.
#[async_trait]
pub trait ConsumeEvents: Send + Sync {
    /// Sends batches on `sender` until shutdown. A new batch is only polled
    /// after the previous one was acknowledged on `ack_receiver`.
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        ack_receiver: mpsc::Receiver<StreamMessage>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ConsumerError>;
}

/// Polls the event queue.
pub struct EventConsumer {
    queue: Arc<EventQueue>,
}

impl EventConsumer {
    pub fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl ConsumeEvents for EventConsumer {
    #[instrument(skip(self, sender, ack_receiver, shutdown))]
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut ack_receiver: mpsc::Receiver<StreamMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ConsumerError> {
        let idle = self.queue.config().idle_interval;
        info!("Event consumer started");

        loop {
            let polled = tokio::select! {
                _ = shutdown.recv() => break,
                polled = self.queue.poll() => polled,
            };

            let events = match polled {
                Ok(events) => events,
                Err(err) => {
                    error!(error = %err, "Failed to poll event queue");
                    let _ = sender.send(StreamMessage::Error(err.to_string())).await;
                    Vec::new()
                }
            };

            if events.is_empty() {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(idle) => continue,
                }
            }

            debug!(event_count = events.len(), "Polled events");
            sender
                .send(StreamMessage::Events { events })
                .await
                .map_err(|e| ConsumerError::ChannelSend(e.to_string()))?;

            tokio::select! {
                _ = shutdown.recv() => break,
                ack = ack_receiver.recv() => match ack {
                    Some(StreamMessage::Acknowledgment { event_ids }) => {
                        debug!(event_count = event_ids.len(), "Batch acknowledged");
                    }
                    Some(other) => warn!(message = ?other, "Unexpected message on ack channel"),
                    None => break,
                },
            }
        }

        info!("Event consumer stopping");
        let _ = sender.send(StreamMessage::End).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::QueueConfig;
    use feed_engine_repository::MemoryFeedStore;
    use feed_engine_shared::types::{EntityType, NewEvent};
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_waits_for_ack_before_polling_again() {
        let store = Arc::new(MemoryFeedStore::new());
        let queue = Arc::new(EventQueue::new(
            store.clone(),
            QueueConfig {
                batch_size: 2,
                idle_interval: Duration::from_millis(5),
                ..QueueConfig::default()
            },
        ));
        for _ in 0..3 {
            queue
                .enqueue(&NewEvent::addition(EntityType::Review, Uuid::new_v4()))
                .await
                .unwrap();
        }

        let (sender, mut receiver) = mpsc::channel(4);
        let (ack_sender, ack_receiver) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let consumer = EventConsumer::new(queue);
        let handle = tokio::spawn(async move { consumer.run(sender, ack_receiver, shutdown_rx).await });

        let Some(StreamMessage::Events { events }) = receiver.recv().await else {
            panic!("expected a batch");
        };
        assert_eq!(events.len(), 2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(receiver.try_recv().is_err());

        ack_sender
            .send(StreamMessage::Acknowledgment {
                event_ids: events.iter().map(|event| event.id).collect(),
            })
            .await
            .unwrap();
        let Some(StreamMessage::Events { events }) = receiver.recv().await else {
            panic!("expected the second batch");
        };
        assert_eq!(events.len(), 1);

        shutdown_tx.send(()).unwrap();
        assert!(matches!(receiver.recv().await, Some(StreamMessage::End)));
        handle.await.unwrap().unwrap();
    }
}
