use std::sync::Arc;

use log::{error, info, warn};
use salesproc_broker::{
    adapters::rabbitmq::{RabbitMqBroker, RabbitMqOptions},
    in_memory::InMemoryBroker,
    Broker,
};
use salesproc_models::errors::{RuntimeError, SendableError};
use salesproc_service::{
    config::{parse_config, BrokerBackend, Config},
    consumer::run_consumer,
    http::{run_server, AppState, SERVICE_NAME},
    processor::SaleProcessor,
};
use salesproc_utilities::startup;
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> Result<(), SendableError> {
    let dotenv = dotenvy::dotenv();
    let config = parse_config()?;
    startup::startup(SERVICE_NAME, config.log_level, config.log_file.as_deref())?;
    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let shutdown = Arc::new(Notify::new());

    // The HTTP surface stays up without a broker; only the consumer is skipped.
    let broker = match build_broker(&config).await {
        Ok(broker) => Some(broker),
        Err(err) => {
            error!("Failed to connect to message broker: {}", err);
            warn!("Consumer not started; /test will report the broker as unavailable");
            None
        }
    };

    let consumer_task = broker.clone().map(|broker| {
        info!(
            "Sales Microservice is listening on RabbitMQ queue: {}",
            config.queue
        );
        let consumer_id = config.consumer_id.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let handler = Arc::new(SaleProcessor::new());
            if let Err(err) = run_consumer(broker, consumer_id, handler, shutdown).await {
                error!("Consumer loop terminated with error: {}", err);
            }
        })
    });

    let state = AppState::new(broker.clone(), config.request_timeout);
    let mut server_task = tokio::spawn(run_server(config.http_addr, state, shutdown.clone()));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!("Failed to listen for shutdown signal: {}", err);
            }
            info!("Shutdown signal received, stopping service...");
            shutdown.notify_waiters();
            match (&mut server_task).await {
                Ok(Err(err)) => error!("HTTP server error: {}", err),
                Err(err) if !err.is_cancelled() => error!("HTTP server task join error: {}", err),
                _ => {}
            }
        }
        result = &mut server_task => {
            shutdown.notify_waiters();
            match result {
                Ok(Ok(())) => info!("HTTP server stopped"),
                Ok(Err(err)) => error!("HTTP server error: {}", err),
                Err(err) => error!("HTTP server task join error: {}", err),
            }
        }
    }

    if let Some(task) = consumer_task {
        if let Err(err) = task.await {
            if !err.is_cancelled() {
                error!("Consumer task join error: {}", err);
            }
        }
    }

    if let Some(broker) = broker {
        if let Err(err) = broker.close().await {
            warn!("Failed to close broker connection: {}", err);
        }
    }

    Ok(())
}

async fn build_broker(config: &Config) -> Result<Arc<dyn Broker>, SendableError> {
    match config.broker_backend {
        BrokerBackend::Rabbitmq => {
            let options = RabbitMqOptions {
                url: config.rabbitmq_url.clone(),
                queue: config.queue.clone(),
                prefetch_count: config.prefetch_count,
            };
            let broker = RabbitMqBroker::connect(&options).await.map_err(|err| {
                Box::new(RuntimeError::new(
                    "service.broker.connect".into(),
                    err.to_string(),
                )) as SendableError
            })?;
            Ok(Arc::new(broker))
        }
        BrokerBackend::InMemory => {
            info!("Using in-memory broker; messages are not shared with other processes");
            Ok(Arc::new(InMemoryBroker::new()))
        }
    }
}
