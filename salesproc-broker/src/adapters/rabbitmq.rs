use crate::{
    Broker, BrokerDelivery, BrokerError, BrokerMessage, MessagePacket, ReplyPacket,
    DIRECT_REPLY_QUEUE,
};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, QueueDeclareOptions,
    },
    types::{FieldTable, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::oneshot, task::JoinHandle};
use uuid::Uuid;

const CONTENT_TYPE_JSON: &str = "application/json";
const PERSISTENT: u8 = 2;
const REPLY_CONSUMER_TAG: &str = "salesproc-replies";

type PendingReplies = Arc<Mutex<HashMap<String, oneshot::Sender<ReplyPacket>>>>;

#[derive(Debug, Clone)]
pub struct RabbitMqOptions {
    pub url: String,
    pub queue: String,
    pub prefetch_count: u16,
}

/// AMQP 0-9-1 backend. Consumes one durable queue with manual acknowledgment.
pub struct RabbitMqBroker {
    connection: Connection,
    channel: Channel,
    rpc_channel: Channel,
    queue: String,
    consumers: tokio::sync::Mutex<HashMap<String, Consumer>>,
    inflight: Mutex<HashMap<Uuid, Acker>>,
    pending: PendingReplies,
    reply_listener: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RabbitMqBroker {
    pub async fn connect(options: &RabbitMqOptions) -> Result<Self, BrokerError> {
        let connection = Connection::connect(&options.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        let rpc_channel = connection.create_channel().await?;

        channel
            .queue_declare(
                &options.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .basic_qos(options.prefetch_count, BasicQosOptions::default())
            .await?;

        info!(
            "Connected to RabbitMQ, queue '{}' (prefetch {})",
            options.queue, options.prefetch_count
        );

        Ok(Self {
            connection,
            channel,
            rpc_channel,
            queue: options.queue.clone(),
            consumers: tokio::sync::Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            reply_listener: tokio::sync::Mutex::new(None),
        })
    }

    async fn publish_packet(
        &self,
        packet: &MessagePacket,
        properties: BasicProperties,
    ) -> Result<(), BrokerError> {
        let payload = packet.to_bytes()?;
        self.rpc_channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                properties
                    .with_content_type(ShortString::from(CONTENT_TYPE_JSON))
                    .with_delivery_mode(PERSISTENT),
            )
            .await?
            .await?;
        Ok(())
    }

    /// Start consuming direct replies, again if the previous listener stopped.
    /// Must run on the channel that publishes requests.
    async fn ensure_reply_listener(&self) -> Result<(), BrokerError> {
        let mut listener = self.reply_listener.lock().await;
        if listener_alive(listener.as_ref()) {
            return Ok(());
        }
        if !self.is_connected() {
            return Err(BrokerError::Disconnected("connection is closed".into()));
        }

        let mut replies = self
            .rpc_channel
            .basic_consume(
                DIRECT_REPLY_QUEUE,
                REPLY_CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        debug!("Listening for replies on {}", DIRECT_REPLY_QUEUE);

        let pending = Arc::clone(&self.pending);
        *listener = Some(tokio::spawn(async move {
            while let Some(next) = replies.next().await {
                match next {
                    Ok(delivery) => dispatch_reply(&pending, delivery),
                    Err(err) => {
                        warn!("Reply consumer stopped: {}", err);
                        break;
                    }
                }
            }
            // Outstanding requests resolve as disconnected.
            pending.lock().clear();
        }));
        Ok(())
    }

    fn take_acker(&self, delivery_id: Uuid) -> Result<Acker, BrokerError> {
        self.inflight
            .lock()
            .remove(&delivery_id)
            .ok_or(BrokerError::UnknownDelivery(delivery_id))
    }
}

fn dispatch_reply(pending: &PendingReplies, delivery: Delivery) {
    let Some(correlation_id) = delivery
        .properties
        .correlation_id()
        .as_ref()
        .map(|id| id.as_str().to_string())
    else {
        warn!("Dropping reply without correlation id");
        return;
    };

    let reply = match ReplyPacket::from_bytes(&delivery.data) {
        Ok(reply) => reply,
        Err(err) => ReplyPacket::failure(Some(correlation_id.clone()), err.to_string()),
    };

    match pending.lock().remove(&correlation_id) {
        Some(sender) => {
            let _ = sender.send(reply);
        }
        None => debug!("No requester waiting for reply {}", correlation_id),
    }
}

fn listener_alive(handle: Option<&JoinHandle<()>>) -> bool {
    handle.is_some_and(|handle| !handle.is_finished())
}

fn short_string(value: &Option<ShortString>) -> Option<String> {
    value.as_ref().map(|value| value.as_str().to_string())
}

#[async_trait]
impl Broker for RabbitMqBroker {
    async fn publish(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let packet = message.into_packet(None);
        self.publish_packet(&packet, BasicProperties::default()).await
    }

    async fn request(&self, message: BrokerMessage, timeout: Duration) -> Result<Value, BrokerError> {
        self.ensure_reply_listener().await?;

        let correlation_id = Uuid::new_v4().to_string();
        let packet = message.into_packet(Some(correlation_id.clone()));
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().insert(correlation_id.clone(), sender);

        let properties = BasicProperties::default()
            .with_reply_to(ShortString::from(DIRECT_REPLY_QUEUE))
            .with_correlation_id(ShortString::from(correlation_id.clone()));
        if let Err(err) = self.publish_packet(&packet, properties).await {
            self.pending.lock().remove(&correlation_id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(reply)) => reply.into_result(),
            Ok(Err(_)) => Err(BrokerError::Disconnected("reply consumer closed".into())),
            Err(_) => {
                self.pending.lock().remove(&correlation_id);
                Err(BrokerError::Timeout(timeout))
            }
        }
    }

    async fn poll(&self, consumer: &str) -> Result<Option<BrokerDelivery>, BrokerError> {
        let mut consumers = self.consumers.lock().await;
        if !consumers.contains_key(consumer) {
            let created = self
                .channel
                .basic_consume(
                    &self.queue,
                    consumer,
                    BasicConsumeOptions {
                        no_ack: false,
                        ..BasicConsumeOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            info!("Consuming '{}' as {}", self.queue, consumer);
            consumers.insert(consumer.to_string(), created);
        }

        let Some(stream) = consumers.get_mut(consumer) else {
            return Ok(None);
        };

        match stream.next().await {
            Some(Ok(delivery)) => {
                let delivery_id = Uuid::new_v4();
                let reply_to = short_string(delivery.properties.reply_to());
                let correlation_id = short_string(delivery.properties.correlation_id());
                let converted = BrokerDelivery {
                    delivery_id,
                    body: delivery.data,
                    reply_to,
                    correlation_id,
                    redelivered: delivery.redelivered,
                    received_at: Utc::now(),
                };
                self.inflight.lock().insert(delivery_id, delivery.acker);
                Ok(Some(converted))
            }
            Some(Err(err)) => Err(err.into()),
            None => {
                consumers.remove(consumer);
                Err(BrokerError::Disconnected(format!(
                    "consumer {consumer} was cancelled"
                )))
            }
        }
    }

    async fn ack(&self, _consumer: &str, delivery_id: Uuid) -> Result<(), BrokerError> {
        let acker = self.take_acker(delivery_id)?;
        acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(&self, _consumer: &str, delivery_id: Uuid, requeue: bool) -> Result<(), BrokerError> {
        let acker = self.take_acker(delivery_id)?;
        acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await?;
        Ok(())
    }

    async fn reply(&self, delivery: &BrokerDelivery, reply: ReplyPacket) -> Result<(), BrokerError> {
        let Some(reply_to) = delivery.reply_to.as_deref() else {
            return Ok(());
        };

        let mut properties =
            BasicProperties::default().with_content_type(ShortString::from(CONTENT_TYPE_JSON));
        if let Some(correlation_id) = delivery.correlation_id.clone().or_else(|| reply.id.clone()) {
            properties = properties.with_correlation_id(ShortString::from(correlation_id));
        }

        let payload = reply.to_bytes()?;
        self.channel
            .basic_publish(
                "",
                reply_to,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.connection.close(200, "shutdown").await?;
        Ok(())
    }
}
