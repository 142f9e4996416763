// Event Bus Implementation - Pub/Sub for Workflow Domain Events
//
// Provides in-memory event streaming using tokio broadcast channels, so
// observers (CLI log taps, future notification fan-out) can follow case
// transitions without polling.
//
// In-memory only: events are lost on restart. The durable record of every
// transition is the audit log, not this bus.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::WorkflowEvent;

/// Event bus for publishing and subscribing to workflow domain events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity
    ///
    /// Capacity bounds how many events a slow subscriber may lag behind
    /// before old events are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create an event bus with the default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: WorkflowEvent) {
        debug!(case_id = %event.case_id(), "Publishing workflow event");
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all workflow events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for workflow events
pub struct EventReceiver {
    receiver: broadcast::Receiver<WorkflowEvent>,
}

impl EventReceiver {
    /// Receive the next event (awaits until one is available)
    pub async fn recv(&mut self) -> Result<WorkflowEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<WorkflowEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => EventBusError::Lagged(n),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus channel closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events")]
    Lagged(u64),
}
