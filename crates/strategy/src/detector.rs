use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use common::{Candle, IndicatorRow, PriceSeries, Signal, TradeAction};

use crate::indicators::{RsiIndicator, SupertrendIndicator};
use crate::SignalDetector;

/// Fewer valid rows than this after warm-up means "not enough history".
pub const MIN_ROWS: usize = 3;

/// Indicator parameters of the reversal detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub rsi_period: usize,
    pub supertrend_period: usize,
    pub supertrend_multiplier: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            supertrend_period: 10,
            supertrend_multiplier: 3.0,
        }
    }
}

/// Supertrend reversal detector.
///
/// Builds RSI + Supertrend state for a candle series and fires when the
/// Supertrend direction of the latest row flipped relative to the row before:
/// `-1 -> +1` is a call, `+1 -> -1` is a put.
#[derive(Debug, Clone)]
pub struct ReversalDetector {
    name: String,
    rsi: RsiIndicator,
    supertrend: SupertrendIndicator,
}

impl Default for ReversalDetector {
    fn default() -> Self {
        Self::new(DetectorParams::default())
    }
}

impl ReversalDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self {
            name: format!(
                "supertrend_{}_{}_reversal",
                params.supertrend_period, params.supertrend_multiplier
            ),
            rsi: RsiIndicator::new(params.rsi_period),
            supertrend: SupertrendIndicator::new(
                params.supertrend_period,
                params.supertrend_multiplier,
            ),
        }
    }

    /// Indicator state for every candle past warm-up, oldest first.
    pub fn indicator_rows(&self, series: &PriceSeries) -> Vec<IndicatorRow> {
        let candles = series.candles();
        let rsi = self.rsi.series(&series.closes());
        let st = self.supertrend.series(candles);

        (1..candles.len())
            .filter_map(|i| {
                let momentum = rsi[i].filter(|v| v.is_finite())?;
                let point = st[i].filter(|p| p.band.is_finite())?;
                let prev = st[i - 1]?;
                Some(IndicatorRow {
                    candle: candles[i],
                    momentum,
                    band: point.band,
                    direction: point.direction,
                    direction_delta: point.direction - prev.direction,
                })
            })
            .collect()
    }
}

/// Classify the last row of an indicator series.
pub fn classify(rows: &[IndicatorRow]) -> Option<TradeAction> {
    if rows.len() < MIN_ROWS {
        return None;
    }
    match rows.last()?.direction_delta {
        2 => Some(TradeAction::Call),
        -2 => Some(TradeAction::Put),
        _ => None,
    }
}

impl SignalDetector for ReversalDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, pair: &str, candles: Vec<Candle>) -> Option<Signal> {
        let series = PriceSeries::new(candles);
        let rows = self.indicator_rows(&series);
        if rows.len() < MIN_ROWS {
            debug!(pair, rows = rows.len(), "Not enough history for a signal");
            return None;
        }

        let action = classify(&rows)?;
        match action {
            TradeAction::Call => info!(pair, "BUY signal detected, decision: CALL"),
            TradeAction::Put => info!(pair, "SELL signal detected, decision: PUT"),
        }
        Some(Signal {
            pair: pair.to_string(),
            action,
            supporting: rows,
        })
    }
}
