use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use log::{error, info};
use salesproc_broker::{Broker, BrokerMessage};
use salesproc_models::{
    core::CreateSale,
    patterns::SALE_CREATE,
    web::{HealthStatus, TestSaleResponse},
};
use tokio::{net::TcpListener, sync::Notify};

pub const SERVICE_NAME: &str = "Sales Processor Microservice";

#[derive(Clone)]
pub struct AppState {
    broker: Option<Arc<dyn Broker>>,
    request_timeout: Duration,
}

impl AppState {
    /// `broker` is `None` when the service started without a broker connection.
    pub fn new(broker: Option<Arc<dyn Broker>>, request_timeout: Duration) -> Self {
        Self {
            broker,
            request_timeout,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/health", get(health))
        .route("/test", get(test_sale))
        .with_state(state)
}

pub async fn run_server(
    addr: SocketAddr,
    state: AppState,
    shutdown: Arc<Notify>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            info!("Shutting down HTTP server...");
        })
        .await
}

async fn hello() -> &'static str {
    "Hello World!"
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let connected = state
        .broker
        .as_ref()
        .is_some_and(|broker| broker.is_connected());

    Json(HealthStatus {
        status: "ok".into(),
        timestamp: Utc::now(),
        service: SERVICE_NAME.into(),
        rabbitmq: if connected { "connected" } else { "disconnected" }.into(),
    })
}

fn sample_sale() -> CreateSale {
    CreateSale {
        product_id: "TEST-001".into(),
        product_name: "Test Product".into(),
        quantity: 1,
        price: 99.99,
        customer_id: "TEST-CUSTOMER".into(),
        customer_name: "Test User".into(),
        timestamp: Some(Utc::now()),
    }
}

async fn test_sale(State(state): State<AppState>) -> Json<TestSaleResponse> {
    let Some(broker) = state.broker.as_ref() else {
        return Json(TestSaleResponse::failed("message broker is not connected"));
    };

    let sale = sample_sale();
    let message = match BrokerMessage::new(SALE_CREATE, &sale) {
        Ok(message) => message,
        Err(err) => return Json(TestSaleResponse::failed(err.to_string())),
    };

    match broker.request(message, state.request_timeout).await {
        Ok(response) => Json(TestSaleResponse::processed(sale, response)),
        Err(err) => {
            error!("Test sale failed: {}", err);
            Json(TestSaleResponse::failed(err.to_string()))
        }
    }
}
