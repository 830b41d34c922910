//! Supertrend: ATR bands around the candle midpoint with a sticky direction.
//!
//! The direction flips to +1 when the close breaks above the previous upper
//! band and to -1 when it breaks below the previous lower band. While the
//! direction holds, the active band only tightens.

use common::Candle;

use super::atr::AtrIndicator;

#[derive(Debug, Clone)]
pub struct SupertrendIndicator {
    pub period: usize,
    pub multiplier: f64,
}

/// Supertrend state at one candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendPoint {
    /// Lower band when trending up, upper band when trending down.
    pub band: f64,
    pub direction: i8,
}

impl SupertrendIndicator {
    pub fn new(period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "Supertrend period must be >= 1");
        assert!(multiplier > 0.0, "Supertrend multiplier must be positive");
        Self { period, multiplier }
    }

    pub fn series(&self, candles: &[Candle]) -> Vec<Option<SupertrendPoint>> {
        let n = candles.len();
        let mut out = vec![None; n];

        let atr = AtrIndicator::new(self.period).series(candles);
        let start = match atr.iter().position(Option::is_some) {
            Some(idx) => idx,
            None => return out,
        };

        let bands = |i: usize, atr: f64| {
            let hl2 = (candles[i].high + candles[i].low) / 2.0;
            (hl2 + self.multiplier * atr, hl2 - self.multiplier * atr)
        };

        let Some(first_atr) = atr[start] else {
            return out;
        };
        let (mut upper, mut lower) = bands(start, first_atr);
        // Start trending up
        let mut direction: i8 = 1;
        out[start] = Some(SupertrendPoint { band: lower, direction });

        for i in (start + 1)..n {
            let Some(atr_i) = atr[i] else {
                break;
            };
            let (basic_upper, basic_lower) = bands(i, atr_i);
            let close = candles[i].close;
            let (mut next_upper, mut next_lower) = (basic_upper, basic_lower);

            if close > upper {
                direction = 1;
            } else if close < lower {
                direction = -1;
            } else {
                // Support only rises in an uptrend, resistance only falls in a downtrend
                if direction > 0 && next_lower < lower {
                    next_lower = lower;
                }
                if direction < 0 && next_upper > upper {
                    next_upper = upper;
                }
            }

            upper = next_upper;
            lower = next_lower;
            let band = if direction > 0 { lower } else { upper };
            out[i] = Some(SupertrendPoint { band, direction });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: Utc.timestamp_opt(i as i64 * 60, 0).unwrap(),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
            })
            .collect()
    }

    #[test]
    fn uptrend_keeps_band_below_price() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let candles = bars_from_closes(&closes);
        let st = SupertrendIndicator::new(10, 3.0).series(&candles);

        for (i, point) in st.iter().enumerate().skip(10) {
            let p = point.expect("supertrend value after warm-up");
            assert_eq!(p.direction, 1, "bar {i}");
            assert!(p.band < candles[i].close);
        }
    }

    #[test]
    fn downtrend_flips_direction_and_band_sits_above_price() {
        let closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        let candles = bars_from_closes(&closes);
        let st = SupertrendIndicator::new(10, 3.0).series(&candles);

        let last = st.last().copied().flatten().unwrap();
        assert_eq!(last.direction, -1);
        assert!(last.band > candles.last().unwrap().close);
    }

    #[test]
    fn warm_up_is_a_prefix() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i % 3) as f64).collect();
        let st = SupertrendIndicator::new(10, 3.0).series(&bars_from_closes(&closes));
        assert!(st[..10].iter().all(Option::is_none));
        assert!(st[10..].iter().all(Option::is_some));
    }

    #[test]
    fn too_few_bars() {
        let st = SupertrendIndicator::new(10, 3.0).series(&bars_from_closes(&[1.0, 2.0, 3.0]));
        assert!(st.iter().all(Option::is_none));
    }
}
