use std::{sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use salesproc_broker::{Broker, BrokerDelivery, BrokerError, ReplyPacket};
use thiserror::Error;
use tokio::sync::Notify;

use crate::handler::{HandlerError, MessageHandler};

const IDLE_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("malformed delivery: {0}")]
    Malformed(#[source] BrokerError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error("broker {context} failed: {source}")]
    Broker {
        context: &'static str,
        #[source]
        source: BrokerError,
    },
}

fn broker_error(context: &'static str) -> impl FnOnce(BrokerError) -> ConsumeError {
    move |source| ConsumeError::Broker { context, source }
}

/// Process one delivery: ack on success, nack without requeue on failure.
///
/// Replies are only published when the sender asked for one. The processing
/// error, if any, is returned after the delivery has been rejected.
pub async fn handle_delivery<H>(
    broker: &dyn Broker,
    consumer: &str,
    handler: &H,
    delivery: BrokerDelivery,
) -> Result<(), ConsumeError>
where
    H: MessageHandler + ?Sized,
{
    let packet = match delivery.packet() {
        Ok(packet) => packet,
        Err(err) => {
            error!(
                "Dropping undecodable delivery {}: {}",
                delivery.delivery_id, err
            );
            reject(broker, consumer, &delivery, None, &err.to_string()).await?;
            return Err(ConsumeError::Malformed(err));
        }
    };

    debug!(
        "Delivery {} carries '{}'{}",
        delivery.delivery_id,
        packet.pattern,
        if delivery.redelivered { " (redelivered)" } else { "" }
    );

    let reply_id = packet.id.clone();
    match handler.handle(&packet.pattern, packet.data).await {
        Ok(response) => {
            broker
                .ack(consumer, delivery.delivery_id)
                .await
                .map_err(broker_error("ack"))?;
            if delivery.expects_reply() {
                broker
                    .reply(&delivery, ReplyPacket::success(reply_id, response))
                    .await
                    .map_err(broker_error("reply"))?;
            }
            Ok(())
        }
        Err(err) => {
            error!("Failed to process '{}' message: {}", packet.pattern, err);
            reject(broker, consumer, &delivery, reply_id, &err.to_string()).await?;
            Err(err.into())
        }
    }
}

async fn reject(
    broker: &dyn Broker,
    consumer: &str,
    delivery: &BrokerDelivery,
    reply_id: Option<String>,
    message: &str,
) -> Result<(), ConsumeError> {
    broker
        .nack(consumer, delivery.delivery_id, false)
        .await
        .map_err(broker_error("nack"))?;

    if delivery.expects_reply() {
        broker
            .reply(delivery, ReplyPacket::failure(reply_id, message))
            .await
            .map_err(broker_error("reply"))?;
    }
    Ok(())
}

/// Consume deliveries one at a time until `shutdown` fires or polling fails.
pub async fn run_consumer<H>(
    broker: Arc<dyn Broker>,
    consumer_id: String,
    handler: Arc<H>,
    shutdown: Arc<Notify>,
) -> Result<(), ConsumeError>
where
    H: MessageHandler + ?Sized,
{
    let stopped = shutdown.notified();
    tokio::pin!(stopped);

    info!("Consumer {} started", consumer_id);
    loop {
        tokio::select! {
            _ = &mut stopped => {
                info!("Consumer {} shutting down", consumer_id);
                break;
            }
            result = broker.poll(&consumer_id) => {
                match result.map_err(broker_error("poll"))? {
                    Some(delivery) => {
                        let delivery_id = delivery.delivery_id;
                        match handle_delivery(broker.as_ref(), &consumer_id, handler.as_ref(), delivery).await {
                            Ok(()) => debug!("Delivery {} acknowledged", delivery_id),
                            Err(ConsumeError::Broker { context, source }) => {
                                warn!("Broker {} failed for delivery {}: {}", context, delivery_id, source);
                            }
                            // Already logged and rejected.
                            Err(_) => {}
                        }
                    }
                    None => tokio::time::sleep(IDLE_BACKOFF).await,
                }
            }
        }
    }

    Ok(())
}
