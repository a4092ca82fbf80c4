//! Event Hubs producer over the REST batch-send endpoint.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use relay_functions_core::batch::{EventBatch, BATCH_CONTENT_TYPE};
use relay_functions_core::connection::EventHubConnection;

use super::signing::event_hubs_sas_token;
use crate::adapters::event_stream::{EventProducer, ProducerFactory};
use crate::adapters::AdapterError;

const EVENT_HUBS_API_VERSION: &str = "2014-01";
const SEND_TIMEOUT_SECONDS: u32 = 60;
const TOKEN_LIFETIME_SECONDS: i64 = 3600;

#[derive(Clone)]
struct HubTarget {
    http: reqwest::Client,
    endpoint: String,
    hub: String,
    key_name: String,
    key: String,
}

impl HubTarget {
    fn resource_uri(&self) -> String {
        format!("{}/{}", self.endpoint, self.hub)
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/messages?timeout={SEND_TIMEOUT_SECONDS}&api-version={EVENT_HUBS_API_VERSION}",
            self.resource_uri()
        )
    }
}

/// Opens one [`EventHubProducer`] per invocation against a single hub.
#[derive(Clone)]
pub struct EventHubProducerFactory {
    target: HubTarget,
    max_batch_bytes: usize,
}

impl std::fmt::Debug for EventHubProducerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHubProducerFactory")
            .field("endpoint", &self.target.endpoint)
            .field("hub", &self.target.hub)
            .field("max_batch_bytes", &self.max_batch_bytes)
            .finish_non_exhaustive()
    }
}

impl EventHubProducerFactory {
    pub fn new(
        http: reqwest::Client,
        connection: &EventHubConnection,
        hub: &str,
        max_batch_bytes: usize,
    ) -> Self {
        Self {
            target: HubTarget {
                http,
                endpoint: connection.https_endpoint(),
                hub: hub.to_string(),
                key_name: connection.key_name.clone(),
                key: connection.key.clone(),
            },
            max_batch_bytes,
        }
    }
}

#[async_trait]
impl ProducerFactory for EventHubProducerFactory {
    type Producer = EventHubProducer;

    async fn open_producer(&self) -> Result<Self::Producer, AdapterError> {
        Ok(EventHubProducer {
            target: self.target.clone(),
            max_batch_bytes: self.max_batch_bytes,
            closed: false,
        })
    }
}

pub struct EventHubProducer {
    target: HubTarget,
    max_batch_bytes: usize,
    closed: bool,
}

impl EventHubProducer {
    fn ensure_open(&self) -> Result<(), AdapterError> {
        if self.closed {
            return Err(AdapterError::InvalidState(format!(
                "producer for event hub '{}' is closed",
                self.target.hub
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EventProducer for EventHubProducer {
    async fn create_batch(&self) -> Result<EventBatch, AdapterError> {
        self.ensure_open()?;
        Ok(EventBatch::new(self.max_batch_bytes))
    }

    async fn send_batch(&self, batch: EventBatch) -> Result<(), AdapterError> {
        self.ensure_open()?;
        if batch.is_empty() {
            return Ok(());
        }

        let expiry = chrono::Utc::now().timestamp() + TOKEN_LIFETIME_SECONDS;
        let token = event_hubs_sas_token(
            &self.target.resource_uri(),
            &self.target.key_name,
            &self.target.key,
            expiry,
        )?;

        let response = self
            .target
            .http
            .post(self.target.messages_url())
            .header(AUTHORIZATION, token)
            .header(CONTENT_TYPE, BATCH_CONTENT_TYPE)
            .body(batch.to_wire_body())
            .send()
            .await
            .map_err(AdapterError::transport("send event batch"))?;

        let status = response.status();
        if status == StatusCode::CREATED {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(AdapterError::Service {
            operation: "send event batch",
            status: status.as_u16(),
            code: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
            message,
        })
    }

    async fn close(&mut self) -> Result<(), AdapterError> {
        self.closed = true;
        Ok(())
    }
}
