use async_trait::async_trait;

use crate::{Candle, Result};

/// Historical candle source.
///
/// Symbols are always the broker-style contiguous pair (`EURUSD`);
/// implementations translate to their own naming at the boundary.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Fetch the most recent `count` candles of `period_secs` width, oldest first.
    /// The last candle may still be forming.
    async fn fetch_candles(&self, pair: &str, period_secs: u64, count: usize)
        -> Result<Vec<Candle>>;
}
