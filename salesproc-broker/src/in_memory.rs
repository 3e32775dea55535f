use crate::{Broker, BrokerDelivery, BrokerError, BrokerMessage, ReplyPacket};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use uuid::Uuid;

const REPLY_QUEUE: &str = "in-memory.reply";

#[derive(Default)]
struct BrokerState {
    queue: VecDeque<BrokerDelivery>,
    inflight: HashMap<Uuid, BrokerDelivery>,
    pending: HashMap<String, oneshot::Sender<ReplyPacket>>,
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries waiting to be polled.
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Deliveries polled but neither acked nor nacked.
    pub fn in_flight(&self) -> usize {
        self.state.lock().inflight.len()
    }

    /// Queue a delivery as-is. The body is not required to be a valid packet.
    pub fn enqueue(&self, delivery: BrokerDelivery) {
        self.state.lock().queue.push_back(delivery);
        self.notify.notify_one();
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let body = message.into_packet(None).to_bytes()?;
        self.enqueue(BrokerDelivery::new(body));
        Ok(())
    }

    async fn request(&self, message: BrokerMessage, timeout: Duration) -> Result<Value, BrokerError> {
        let correlation_id = Uuid::new_v4().to_string();
        let body = message.into_packet(Some(correlation_id.clone())).to_bytes()?;
        let (sender, receiver) = oneshot::channel();
        self.state.lock().pending.insert(correlation_id.clone(), sender);
        self.enqueue(BrokerDelivery::new(body).with_reply_to(REPLY_QUEUE, correlation_id.clone()));

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(reply)) => reply.into_result(),
            Ok(Err(_)) => Err(BrokerError::Disconnected("reply channel dropped".into())),
            Err(_) => {
                self.state.lock().pending.remove(&correlation_id);
                Err(BrokerError::Timeout(timeout))
            }
        }
    }

    async fn poll(&self, _consumer: &str) -> Result<Option<BrokerDelivery>, BrokerError> {
        loop {
            if let Some(delivery) = {
                let mut guard = self.state.lock();
                if let Some(delivery) = guard.queue.pop_front() {
                    guard
                        .inflight
                        .insert(delivery.delivery_id, delivery.clone());
                    Some(delivery)
                } else {
                    None
                }
            } {
                return Ok(Some(delivery));
            }

            self.notify.notified().await;
        }
    }

    async fn ack(&self, _consumer: &str, delivery_id: Uuid) -> Result<(), BrokerError> {
        let mut guard = self.state.lock();
        if guard.inflight.remove(&delivery_id).is_some() {
            Ok(())
        } else {
            Err(BrokerError::UnknownDelivery(delivery_id))
        }
    }

    async fn nack(&self, _consumer: &str, delivery_id: Uuid, requeue: bool) -> Result<(), BrokerError> {
        let mut guard = self.state.lock();
        let Some(mut delivery) = guard.inflight.remove(&delivery_id) else {
            return Err(BrokerError::UnknownDelivery(delivery_id));
        };

        if requeue {
            delivery.redelivered = true;
            guard.queue.push_front(delivery);
            drop(guard);
            self.notify.notify_one();
        } else {
            debug!("Discarding delivery {}", delivery_id);
        }
        Ok(())
    }

    async fn reply(&self, delivery: &BrokerDelivery, reply: ReplyPacket) -> Result<(), BrokerError> {
        let Some(correlation_id) = delivery.correlation_id.clone().or_else(|| reply.id.clone()) else {
            return Err(BrokerError::Internal("reply without correlation id".into()));
        };

        let sender = self.state.lock().pending.remove(&correlation_id);
        match sender {
            Some(sender) => {
                // The requester may have timed out in the meantime.
                let _ = sender.send(reply);
            }
            None => debug!("No requester waiting for reply {}", correlation_id),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(pattern: &str) -> BrokerMessage {
        BrokerMessage::new(pattern, &json!({ "id": 1 })).unwrap()
    }

    #[tokio::test]
    async fn publish_then_poll_in_order() {
        let broker = InMemoryBroker::new();
        broker.publish(message("sale.create")).await.unwrap();
        broker.publish(message("sale.update")).await.unwrap();

        let first = broker.poll("c").await.unwrap().unwrap();
        let second = broker.poll("c").await.unwrap().unwrap();
        assert_eq!(first.packet().unwrap().pattern, "sale.create");
        assert_eq!(second.packet().unwrap().pattern, "sale.update");
        assert_eq!(broker.in_flight(), 2);
        assert!(!first.expects_reply());
    }

    #[tokio::test]
    async fn ack_removes_in_flight_delivery() {
        let broker = InMemoryBroker::new();
        broker.publish(message("sale.create")).await.unwrap();
        let delivery = broker.poll("c").await.unwrap().unwrap();

        broker.ack("c", delivery.delivery_id).await.unwrap();
        assert_eq!(broker.in_flight(), 0);
        assert!(matches!(
            broker.ack("c", delivery.delivery_id).await,
            Err(BrokerError::UnknownDelivery(_))
        ));
    }

    #[tokio::test]
    async fn nack_without_requeue_discards() {
        let broker = InMemoryBroker::new();
        broker.publish(message("sale.create")).await.unwrap();
        let delivery = broker.poll("c").await.unwrap().unwrap();

        broker.nack("c", delivery.delivery_id, false).await.unwrap();
        assert_eq!(broker.queued(), 0);
        assert_eq!(broker.in_flight(), 0);
    }

    #[tokio::test]
    async fn nack_with_requeue_redelivers_first() {
        let broker = InMemoryBroker::new();
        broker.publish(message("sale.create")).await.unwrap();
        broker.publish(message("sale.update")).await.unwrap();
        let delivery = broker.poll("c").await.unwrap().unwrap();

        broker.nack("c", delivery.delivery_id, true).await.unwrap();
        let again = broker.poll("c").await.unwrap().unwrap();
        assert_eq!(again.delivery_id, delivery.delivery_id);
        assert!(again.redelivered);
    }

    #[tokio::test]
    async fn raw_deliveries_surface_decode_errors() {
        let broker = InMemoryBroker::new();
        broker.enqueue(BrokerDelivery::new(b"{ not json".to_vec()));

        let delivery = broker.poll("c").await.unwrap().unwrap();
        assert!(matches!(delivery.packet(), Err(BrokerError::Decode(_))));
        assert_eq!(broker.in_flight(), 1);
    }

    #[tokio::test]
    async fn request_resolves_with_reply() {
        let broker = InMemoryBroker::new();
        let consumer = broker.clone();
        let responder = tokio::spawn(async move {
            let delivery = consumer.poll("c").await.unwrap().unwrap();
            let packet = delivery.packet().unwrap();
            assert!(delivery.expects_reply());
            assert_eq!(packet.id, delivery.correlation_id);
            consumer.ack("c", delivery.delivery_id).await.unwrap();
            consumer
                .reply(&delivery, ReplyPacket::success(packet.id, json!({ "ok": true })))
                .await
                .unwrap();
        });

        let response = broker
            .request(message("sale.create"), Duration::from_secs(1))
            .await
            .unwrap();
        responder.await.unwrap();
        assert_eq!(response, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn request_surfaces_remote_error() {
        let broker = InMemoryBroker::new();
        let consumer = broker.clone();
        tokio::spawn(async move {
            let delivery = consumer.poll("c").await.unwrap().unwrap();
            consumer
                .reply(&delivery, ReplyPacket::failure(None, "bad payload"))
                .await
                .unwrap();
        });

        let err = broker
            .request(message("sale.create"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Remote(message) if message == "bad payload"));
    }

    #[tokio::test]
    async fn request_times_out_without_consumer() {
        let broker = InMemoryBroker::new();
        let err = broker
            .request(message("sale.create"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Timeout(_)));
        assert_eq!(broker.queued(), 1);
    }
}
