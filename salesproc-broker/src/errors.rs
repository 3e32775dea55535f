use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("delivery not found: {0}")]
    UnknownDelivery(uuid::Uuid),
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no reply within {0:?}")]
    Timeout(std::time::Duration),
    #[error("broker connection lost: {0}")]
    Disconnected(String),
    #[error("remote handler failed: {0}")]
    Remote(String),
    #[error("internal broker error: {0}")]
    Internal(String),
}

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::InvalidConnectionState(_) | lapin::Error::InvalidChannelState(_) => {
                BrokerError::Disconnected(err.to_string())
            }
            other => BrokerError::Internal(other.to_string()),
        }
    }
}
