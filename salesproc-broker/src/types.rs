use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::BrokerError;

/// RabbitMQ pseudo-queue used to receive replies without declaring a queue.
pub const DIRECT_REPLY_QUEUE: &str = "amq.rabbitmq.reply-to";

/// JSON body carried by every message on the queue.
///
/// `id` is only present on requests that expect a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePacket {
    pub pattern: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Reply published back to the requester's `reply_to` queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPacket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default)]
    pub is_disposed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Payload handed to the broker for publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub pattern: String,
    pub data: Value,
}

/// Message returned when polling the broker.
#[derive(Debug, Clone)]
pub struct BrokerDelivery {
    pub delivery_id: Uuid,
    pub body: Vec<u8>,
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
    pub redelivered: bool,
    pub received_at: DateTime<Utc>,
}

impl MessagePacket {
    pub fn to_bytes(&self) -> Result<Vec<u8>, BrokerError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl ReplyPacket {
    pub fn success(id: Option<String>, response: Value) -> Self {
        Self {
            err: None,
            response: Some(response),
            is_disposed: true,
            id,
        }
    }

    pub fn failure(id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            err: Some(serde_json::json!({
                "status": "error",
                "message": message.into(),
            })),
            response: None,
            is_disposed: true,
            id,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BrokerError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(body: &[u8]) -> Result<Self, BrokerError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Resolve the reply into the handler's response, or the error it reported.
    pub fn into_result(self) -> Result<Value, BrokerError> {
        match self.err {
            Some(Value::Null) | None => Ok(self.response.unwrap_or(Value::Null)),
            Some(err) => {
                let message = err
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                Err(BrokerError::Remote(message))
            }
        }
    }
}

impl BrokerMessage {
    pub fn new<T>(pattern: impl Into<String>, data: &T) -> Result<Self, BrokerError>
    where
        T: Serialize,
    {
        Ok(Self {
            pattern: pattern.into(),
            data: serde_json::to_value(data)?,
        })
    }

    pub fn into_packet(self, id: Option<String>) -> MessagePacket {
        MessagePacket {
            pattern: self.pattern,
            data: self.data,
            id,
        }
    }
}

impl BrokerDelivery {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            delivery_id: Uuid::new_v4(),
            body,
            reply_to: None,
            correlation_id: None,
            redelivered: false,
            received_at: Utc::now(),
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Decode the body as a message packet.
    pub fn packet(&self) -> Result<MessagePacket, BrokerError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn expects_reply(&self) -> bool {
        self.reply_to.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn packet_wire_format() {
        let message = BrokerMessage::new("sale.update", &json!({ "id": 2, "quantity": 5 })).unwrap();
        let packet = message.into_packet(Some("abc".into()));
        let wire: Value = serde_json::from_slice(&packet.to_bytes().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({ "pattern": "sale.update", "data": { "id": 2, "quantity": 5 }, "id": "abc" })
        );
    }

    #[test]
    fn events_omit_id() {
        let packet = BrokerMessage::new("sale.create", &json!({}))
            .unwrap()
            .into_packet(None);
        let wire: Value = serde_json::from_slice(&packet.to_bytes().unwrap()).unwrap();
        assert!(wire.get("id").is_none());
    }

    #[test]
    fn reply_success_uses_is_disposed_field() {
        let reply = ReplyPacket::success(Some("abc".into()), json!({ "success": true }));
        let wire: Value = serde_json::from_slice(&reply.to_bytes().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({ "response": { "success": true }, "isDisposed": true, "id": "abc" })
        );
        assert_eq!(reply.into_result().unwrap(), json!({ "success": true }));
    }

    #[test]
    fn reply_failure_surfaces_message() {
        let reply = ReplyPacket::failure(None, "boom");
        match reply.into_result() {
            Err(BrokerError::Remote(message)) => assert_eq!(message, "boom"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn null_err_counts_as_success() {
        let reply = ReplyPacket::from_bytes(br#"{"err":null,"response":42,"isDisposed":true}"#).unwrap();
        assert_eq!(reply.into_result().unwrap(), json!(42));
    }

    #[test]
    fn undecodable_body_is_a_decode_error() {
        let delivery = BrokerDelivery::new(b"not json".to_vec());
        assert!(matches!(delivery.packet(), Err(BrokerError::Decode(_))));
        assert!(!delivery.expects_reply());
    }
}
