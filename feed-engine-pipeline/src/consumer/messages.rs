//! Messages exchanged between the consumer task and the orchestrator.
use feed_engine_shared::types::{Event, EventId};

#[derive(Debug)]
pub enum StreamMessage {
    /// A batch of claimed events, in queue order.
    Events { events: Vec<Event> },
    /// Every event of the previous batch has been acked; the consumer may
    /// poll again.
    Acknowledgment { event_ids: Vec<EventId> },
    /// The consumer stopped.
    End,
    /// Polling failed; the consumer keeps going.
    Error(String),
}
