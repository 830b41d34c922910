use common::Candle;

/// Average True Range with Wilder smoothing.
///
/// The first candle has no previous close, so the seed average starts at
/// index 1 and the first value appears at index `period`.
#[derive(Debug, Clone)]
pub struct AtrIndicator {
    pub period: usize,
}

impl AtrIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self { period }
    }

    pub fn series(&self, candles: &[Candle]) -> Vec<Option<f64>> {
        let tr = true_range(candles);
        let mut out = vec![None; candles.len()];
        if candles.len() < self.period + 1 {
            return out;
        }

        let mut atr = tr[1..=self.period].iter().sum::<f64>() / self.period as f64;
        out[self.period] = Some(atr);

        let p = self.period as f64;
        for i in (self.period + 1)..candles.len() {
            atr = (atr * (p - 1.0) + tr[i]) / p;
            out[i] = Some(atr);
        }
        out
    }
}

/// TR[0] = high - low; TR[t] = max(high-low, |high-prev_close|, |low-prev_close|).
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let range = c.high - c.low;
            match i.checked_sub(1).map(|p| candles[p].close) {
                Some(pc) => range.max((c.high - pc).abs()).max((c.low - pc).abs()),
                None => range,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars(data: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        data.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: Utc.timestamp_opt(i as i64 * 60, 0).unwrap(),
                open,
                high,
                low,
                close,
            })
            .collect()
    }

    #[test]
    fn true_range_uses_previous_close() {
        let candles = bars(&[
            (100.0, 105.0, 95.0, 102.0),  // TR = 10
            (102.0, 108.0, 100.0, 106.0), // TR = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = 9
            (110.0, 115.0, 108.0, 112.0), // gap up: |115-99| = 16
        ]);
        let tr = true_range(&candles);
        assert_eq!(tr, vec![10.0, 8.0, 9.0, 16.0]);
    }

    #[test]
    fn atr_seeds_then_smooths() {
        let candles = bars(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0), // 8
            (106.0, 107.0, 98.0, 99.0),   // 9
            (99.0, 103.0, 97.0, 101.0),   // 6
            (101.0, 104.0, 100.0, 103.0), // 4
        ]);
        let atr = AtrIndicator::new(3).series(&candles);
        assert!(atr[..3].iter().all(Option::is_none));
        let seed = (8.0 + 9.0 + 6.0) / 3.0;
        assert!((atr[3].unwrap() - seed).abs() < 1e-9);
        let next = (seed * 2.0 + 4.0) / 3.0;
        assert!((atr[4].unwrap() - next).abs() < 1e-9);
    }

    #[test]
    fn atr_too_few_bars() {
        let candles = bars(&[(100.0, 105.0, 95.0, 102.0), (102.0, 108.0, 100.0, 106.0)]);
        assert!(AtrIndicator::new(3).series(&candles).iter().all(Option::is_none));
    }
}
