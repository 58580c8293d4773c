//! HTTP webhook sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use roadmap_core::BusEvent;
use tracing::debug;

use crate::bus::{EventBus, PublishError};

/// POSTs each event as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookEventBus {
    /// HTTP client
    client: Client,

    /// Receiver endpoint
    url: String,
}

impl WebhookEventBus {
    /// Create a sink whose requests give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        Ok(Self {
            client: ClientBuilder::new().timeout(timeout).build()?,
            url: url.into(),
        })
    }

    /// Receiver endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventBus for WebhookEventBus {
    async fn publish(&self, event: BusEvent) -> Result<(), PublishError> {
        let response = self.client.post(&self.url).json(&event).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected {
                event_type: event.event_type,
                status: status.as_u16(),
            });
        }

        debug!(url = %self.url, event_type = %event.event_type, "webhook delivered");
        Ok(())
    }
}
