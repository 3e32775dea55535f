use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid '{pattern}' payload: {source}")]
    Decode {
        pattern: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no handler registered for pattern '{0}'")]
    UnknownPattern(String),
    #[error("processing failed: {0}")]
    Processing(String),
}

/// Handles the decoded body of a single delivery and produces its reply.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, pattern: &str, data: Value) -> Result<Value, HandlerError>;
}
