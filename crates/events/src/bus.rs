//! Event sink contract and the in-process sinks.

use std::sync::Mutex;

use async_trait::async_trait;
use roadmap_core::BusEvent;
use tracing::debug;

/// Publishing an event failed.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The request never got a response
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The sink answered with a non-success status
    #[error("sink rejected {event_type} with status {status}")]
    Rejected {
        /// Event type that was refused
        event_type: String,
        /// HTTP status code
        status: u16,
    },

    /// Any other sink failure
    #[error("{0}")]
    Sink(String),
}

/// Destination for published events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Deliver one event.
    async fn publish(&self, event: BusEvent) -> Result<(), PublishError>;
}

/// Keeps every published event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<BusEvent>>,
}

impl RecordingEventBus {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in arrival order.
    pub fn events(&self) -> Vec<BusEvent> {
        self.lock().clone()
    }

    /// Type tags of everything published so far.
    pub fn event_types(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Forget recorded events.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BusEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, event: BusEvent) -> Result<(), PublishError> {
        self.lock().push(event);
        Ok(())
    }
}

/// Writes each event to the `tracing` log at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventBus;

#[async_trait]
impl EventBus for LogEventBus {
    async fn publish(&self, event: BusEvent) -> Result<(), PublishError> {
        let payload = serde_json::Value::Object(event.payload);
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            source = %event.source,
            %payload,
            "event"
        );
        Ok(())
    }
}
