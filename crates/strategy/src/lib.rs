pub mod detector;
pub mod indicators;

pub use detector::{classify, ReversalDetector, MIN_ROWS};

use common::{Candle, Signal};

/// Signal source consulted once per eligible instrument per cycle.
pub trait SignalDetector: Send + Sync {
    /// Human-readable name shown in logs.
    fn name(&self) -> &str;

    /// Classify the latest candle of `candles`.
    ///
    /// Input may be unsorted or contain duplicate timestamps.
    /// Returns `None` if no actionable signal is present.
    fn detect(&self, pair: &str, candles: Vec<Candle>) -> Option<Signal>;
}
