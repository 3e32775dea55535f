use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::CreateSale;

/// Acknowledgment returned for every processed sale message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> SaleResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub rabbitmq: String,
}

/// Body of `GET /test`. Successful runs carry the sent record and the reply,
/// failed runs carry the error text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestSaleResponse {
    #[serde(rename_all = "camelCase")]
    Processed {
        success: bool,
        message: String,
        sent_data: CreateSale,
        response: serde_json::Value,
    },
    Failed {
        success: bool,
        message: String,
        error: String,
    },
}

impl TestSaleResponse {
    pub fn processed(sent_data: CreateSale, response: serde_json::Value) -> Self {
        Self::Processed {
            success: true,
            message: "Test sale processed successfully".into(),
            sent_data,
            response,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            success: false,
            message: "Failed to process test sale".into(),
            error: error.into(),
        }
    }
}
