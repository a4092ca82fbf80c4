use async_trait::async_trait;
use relay_functions_core::batch::EventBatch;

use super::AdapterError;

/// A producer owned by exactly one invocation.
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn create_batch(&self) -> Result<EventBatch, AdapterError>;

    async fn send_batch(&self, batch: EventBatch) -> Result<(), AdapterError>;

    /// Releases the producer. Sending after close is an error.
    async fn close(&mut self) -> Result<(), AdapterError>;
}

#[async_trait]
pub trait ProducerFactory: Send + Sync {
    type Producer: EventProducer;

    async fn open_producer(&self) -> Result<Self::Producer, AdapterError>;
}
