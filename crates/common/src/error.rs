use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid instrument symbol: {0}")]
    Symbol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
