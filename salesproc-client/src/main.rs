mod config;
mod fixtures;

use clap::Parser;
use config::Config;
use log::{error, info};
use salesproc_broker::{
    adapters::rabbitmq::{RabbitMqBroker, RabbitMqOptions},
    Broker, BrokerMessage,
};
use salesproc_models::patterns::{SALE_CREATE, SALE_UPDATE};
use serde::Serialize;
use tokio::time::{self, Duration};

type DynError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), DynError> {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::parse();

    info!("Starting test client for the sales microservice");
    let broker = RabbitMqBroker::connect(&RabbitMqOptions {
        url: config.rabbitmq_url.clone(),
        queue: config.queue.clone(),
        prefetch_count: 1,
    })
    .await?;
    info!("Connected to RabbitMQ");

    info!("Testing sale creation...");
    for sale in fixtures::mock_sales() {
        info!("Sending create request for: {}", sale.product_name);
        send(&broker, &config, SALE_CREATE, &sale).await;
    }

    info!("Testing sale updates...");
    for update in fixtures::mock_updates() {
        info!("Sending update request for sale ID: {}", update.id);
        send(&broker, &config, SALE_UPDATE, &update).await;
    }

    info!("All messages sent");
    broker.close().await?;
    info!("Client disconnected");
    Ok(())
}

async fn send<T>(broker: &dyn Broker, config: &Config, pattern: &str, payload: &T)
where
    T: Serialize,
{
    match deliver(broker, config, pattern, payload).await {
        Ok(Some(response)) => match serde_json::to_string_pretty(&response) {
            Ok(pretty) => info!("Response: {}", pretty),
            Err(_) => info!("Response: {}", response),
        },
        Ok(None) => info!("Published {}", pattern),
        Err(err) => error!("Error: {}", err),
    }

    time::sleep(Duration::from_millis(config.delay_ms)).await;
}

async fn deliver<T>(
    broker: &dyn Broker,
    config: &Config,
    pattern: &str,
    payload: &T,
) -> Result<Option<serde_json::Value>, DynError>
where
    T: Serialize,
{
    let message = BrokerMessage::new(pattern, payload)?;
    if config.no_wait {
        broker.publish(message).await?;
        return Ok(None);
    }

    let timeout = Duration::from_secs(config.request_timeout_seconds.max(1));
    Ok(Some(broker.request(message, timeout).await?))
}
