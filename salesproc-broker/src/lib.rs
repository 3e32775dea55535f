pub mod adapters;
mod errors;
pub mod in_memory;
mod types;

pub use errors::BrokerError;
pub use types::{BrokerDelivery, BrokerMessage, MessagePacket, ReplyPacket, DIRECT_REPLY_QUEUE};

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Trait implemented by queue backends capable of delivering sale messages.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Publish a message that expects no reply.
    async fn publish(&self, message: BrokerMessage) -> Result<(), BrokerError>;

    /// Publish a message and wait for the consumer's reply.
    async fn request(&self, message: BrokerMessage, timeout: Duration) -> Result<Value, BrokerError>;

    /// Retrieve the next available delivery for the supplied consumer.
    async fn poll(&self, consumer: &str) -> Result<Option<BrokerDelivery>, BrokerError>;

    /// Acknowledge successful processing of a delivery.
    async fn ack(&self, consumer: &str, delivery_id: uuid::Uuid) -> Result<(), BrokerError>;

    /// Reject a delivery. Without `requeue` the broker drops it.
    async fn nack(
        &self,
        consumer: &str,
        delivery_id: uuid::Uuid,
        requeue: bool,
    ) -> Result<(), BrokerError>;

    /// Send a reply to whoever published `delivery`.
    async fn reply(&self, delivery: &BrokerDelivery, reply: ReplyPacket) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool {
        true
    }

    /// Release the underlying connection, if any.
    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}
