use crate::log_store::LogRecordError;
use crate::protocol::ProtocolError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, LinkError>;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Log record error: {0}")]
    LogRecord(#[from] LogRecordError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
