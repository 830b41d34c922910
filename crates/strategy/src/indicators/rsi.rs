/// RSI (Relative Strength Index) indicator.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI).
/// No value exists until at least `period + 1` close prices are available.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self { period }
    }

    /// RSI for every index of `closes` (oldest first). Index `i` only uses
    /// `closes[..=i]`; the first `period` entries are `None`.
    pub fn series(&self, closes: &[f64]) -> Vec<Option<f64>> {
        let mut out = vec![None; closes.len()];
        if closes.len() < self.period + 1 {
            return out;
        }

        // First average gain/loss over the initial `period` changes
        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..self.period];

        let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / self.period as f64;
        let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>()
            / self.period as f64;
        out[self.period] = Some(rsi_from(avg_gain, avg_loss));

        // Wilder smoothing over remaining changes
        for (offset, &change) in changes[self.period..].iter().enumerate() {
            let gain = if change > 0.0 { change } else { 0.0 };
            let loss = if change < 0.0 { change.abs() } else { 0.0 };
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
            out[self.period + offset + 1] = Some(rsi_from(avg_gain, avg_loss));
        }

        out
    }

    /// RSI of the latest close, `None` if there are fewer than `period + 1` values.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        self.series(closes).last().copied().flatten()
    }
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
