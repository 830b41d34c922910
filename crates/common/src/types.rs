use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLC price bar. Immutable once fetched from the market-data provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Candles for a single instrument, sorted ascending and unique by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    candles: Vec<Candle>,
}

impl PriceSeries {
    /// Build a series from raw provider output. Sorts by timestamp and keeps
    /// the last candle seen for any duplicated timestamp.
    pub fn new(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match deduped.last_mut() {
                Some(last) if last.timestamp == candle.timestamp => *last = candle,
                _ => deduped.push(candle),
            }
        }
        Self { candles: deduped }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

/// Direction of a binary option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    /// Price expected to finish above the entry.
    Call,
    /// Price expected to finish below the entry.
    Put,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Call => write!(f, "call"),
            TradeAction::Put => write!(f, "put"),
        }
    }
}

/// Final result of one trade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeResult {
    Win,
    Loss,
    PlacementFailed,
}

impl std::fmt::Display for TradeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeResult::Win => write!(f, "win"),
            TradeResult::Loss => write!(f, "loss"),
            TradeResult::PlacementFailed => write!(f, "placement failed"),
        }
    }
}

/// Settled trade as reported back by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub trade_id: String,
    pub result: TradeResult,
}

/// Broker reply to an order placement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Placement {
    pub accepted: bool,
    pub trade_id: Option<String>,
}

impl Placement {
    pub fn accepted(trade_id: impl Into<String>) -> Self {
        Self {
            accepted: true,
            trade_id: Some(trade_id.into()),
        }
    }

    pub fn rejected() -> Self {
        Self::default()
    }

    /// The trade id, only when the broker accepted the order and returned one.
    pub fn confirmed_id(&self) -> Option<&str> {
        if self.accepted {
            self.trade_id.as_deref()
        } else {
            None
        }
    }
}

/// Broker-side status of a placed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Pending,
    Closed(TradeResult),
}

/// An instrument currently passing the payout / activity / asset-class filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibleInstrument {
    pub symbol: String,
    pub payout_percent: f64,
    pub asset_class: String,
}

/// Indicator state derived for one candle. Only fully populated rows exist:
/// warm-up candles are dropped before rows are built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub candle: Candle,
    /// RSI momentum value (0–100).
    pub momentum: f64,
    /// Active Supertrend band.
    pub band: f64,
    /// +1 when price trades above the band, -1 below.
    pub direction: i8,
    /// `direction[i] - direction[i - 1]`; one of -2, 0, +2.
    pub direction_delta: i8,
}

impl std::fmt::Display for IndicatorRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} o={:.5} h={:.5} l={:.5} c={:.5} rsi={:.2} st={:.5} dir={:+} delta={:+}",
            self.candle.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.candle.open,
            self.candle.high,
            self.candle.low,
            self.candle.close,
            self.momentum,
            self.band,
            self.direction,
            self.direction_delta,
        )
    }
}

/// Trend-reversal signal selected for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub pair: String,
    pub action: TradeAction,
    /// Indicator rows the decision was taken on, oldest first.
    pub supporting: Vec<IndicatorRow>,
}

impl Signal {
    /// The last `n` supporting rows, oldest first.
    pub fn tail(&self, n: usize) -> &[IndicatorRow] {
        let start = self.supporting.len().saturating_sub(n);
        &self.supporting[start..]
    }
}

/// Whether the bot is trading against the real broker or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(secs: i64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
        }
    }

    #[test]
    fn price_series_sorts_ascending() {
        let series = PriceSeries::new(vec![candle(120, 3.0), candle(0, 1.0), candle(60, 2.0)]);
        assert_eq!(series.closes(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn price_series_dedups_by_timestamp() {
        let series = PriceSeries::new(vec![candle(0, 1.0), candle(60, 2.0), candle(60, 2.5)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.last().unwrap().close, 2.5);
    }

    #[test]
    fn placement_without_id_is_not_confirmed() {
        let placement = Placement {
            accepted: true,
            trade_id: None,
        };
        assert!(placement.confirmed_id().is_none());
        assert!(Placement::rejected().confirmed_id().is_none());
        assert_eq!(Placement::accepted("abc").confirmed_id(), Some("abc"));
    }

    #[test]
    fn trade_action_displays_broker_names() {
        assert_eq!(TradeAction::Call.to_string(), "call");
        assert_eq!(TradeAction::Put.to_string(), "put");
    }
}
