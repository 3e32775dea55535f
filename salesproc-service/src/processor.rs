use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use salesproc_models::{
    core::{CreateSale, UpdateSale},
    patterns::SalePattern,
    web::SaleResponse,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::handler::{HandlerError, MessageHandler};

pub const SALE_CREATED: &str = "Sale created and processed";

pub fn sale_updated(id: i64) -> String {
    format!("Sale #{id} updated and processed")
}

/// Logs incoming sales and echoes them back. Holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaleProcessor;

impl SaleProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn create(&self, sale: CreateSale) -> SaleResponse<CreateSale> {
        log_lines(describe_create(&sale, Utc::now()));
        SaleResponse::ok(SALE_CREATED, sale)
    }

    pub fn update(&self, sale: UpdateSale) -> SaleResponse<UpdateSale> {
        log_lines(describe_update(&sale));
        SaleResponse::ok(sale_updated(sale.id), sale)
    }
}

fn log_lines(lines: Vec<String>) {
    for line in lines {
        info!("{}", line);
    }
}

/// Log lines for a new sale. `received_at` stands in for a missing timestamp.
pub fn describe_create(sale: &CreateSale, received_at: DateTime<Utc>) -> Vec<String> {
    let timestamp = match sale.timestamp {
        Some(timestamp) => format_timestamp(timestamp),
        None => format!("{} (received)", format_timestamp(received_at)),
    };

    vec![
        "New sale received".to_string(),
        format!("  Product: {} ({})", sale.product_name, sale.product_id),
        format!("  Quantity: {}", sale.quantity),
        format!("  Price: ${:.2}", sale.price),
        format!("  Customer: {} ({})", sale.customer_name, sale.customer_id),
        format!("  Timestamp: {}", timestamp),
    ]
}

pub fn describe_update(sale: &UpdateSale) -> Vec<String> {
    let mut lines = vec![format!("Updating sale #{}", sale.id)];
    if let Some(product_id) = &sale.product_id {
        lines.push(format!("  Product ID: {}", product_id));
    }
    if let Some(product_name) = &sale.product_name {
        lines.push(format!("  Product: {}", product_name));
    }
    if let Some(quantity) = sale.quantity {
        lines.push(format!("  Quantity: {}", quantity));
    }
    if let Some(price) = sale.price {
        lines.push(format!("  Price: ${:.2}", price));
    }
    if let Some(customer_id) = &sale.customer_id {
        lines.push(format!("  Customer ID: {}", customer_id));
    }
    if let Some(customer_name) = &sale.customer_name {
        lines.push(format!("  Customer: {}", customer_name));
    }
    if let Some(timestamp) = sale.timestamp {
        lines.push(format!("  Timestamp: {}", format_timestamp(timestamp)));
    }
    if sale.is_empty() {
        lines.push("  No fields changed".to_string());
    }
    lines
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode<T>(pattern: &str, data: &Value) -> Result<T, HandlerError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(data.clone()).map_err(|source| HandlerError::Decode {
        pattern: pattern.to_string(),
        source,
    })
}

fn encode<T>(response: &T) -> Result<Value, HandlerError>
where
    T: Serialize,
{
    serde_json::to_value(response).map_err(|err| HandlerError::Processing(err.to_string()))
}

#[async_trait]
impl MessageHandler for SaleProcessor {
    async fn handle(&self, pattern: &str, data: Value) -> Result<Value, HandlerError> {
        let kind = SalePattern::parse(pattern)
            .ok_or_else(|| HandlerError::UnknownPattern(pattern.to_string()))?;
        if SalePattern::is_legacy(pattern) {
            warn!(
                "Received deprecated pattern '{}', publishers should send '{}'",
                pattern,
                kind.as_str()
            );
        }

        // The typed record is only used for logging; the reply echoes `data` as received.
        match kind {
            SalePattern::Create => {
                let sale: CreateSale = decode(pattern, &data)?;
                log_lines(describe_create(&sale, Utc::now()));
                encode(&SaleResponse::ok(SALE_CREATED, data))
            }
            SalePattern::Update => {
                let sale: UpdateSale = decode(pattern, &data)?;
                log_lines(describe_update(&sale));
                encode(&SaleResponse::ok(sale_updated(sale.id), data))
            }
        }
    }
}
