pub mod broker;
pub mod clock;
pub mod config;
pub mod error;
pub mod market;
pub mod types;

pub use broker::{BrokerClient, TradeExecutor};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, TradingConfig};
pub use error::{Error, Result};
pub use market::MarketData;
pub use types::*;
