use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use common::{Candle, PriceSeries};
use strategy::{classify, ReversalDetector, SignalDetector};

fn random_walk(steps: &[(f64, f64)]) -> Vec<Candle> {
    let mut close = 100.0;
    steps
        .iter()
        .enumerate()
        .map(|(i, &(step, spread))| {
            close += step;
            Candle {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                open: close - step,
                high: close + spread,
                low: close - spread,
                close,
            }
        })
        .collect()
}

proptest! {
    /// Direction deltas are the discrete difference of consecutive directions.
    #[test]
    fn direction_delta_is_bounded_difference(
        steps in prop::collection::vec((-2.0f64..2.0, 0.01f64..1.5), 20..150),
    ) {
        let series = PriceSeries::new(random_walk(&steps));
        let rows = ReversalDetector::default().indicator_rows(&series);

        for row in &rows {
            prop_assert!(row.direction == 1 || row.direction == -1);
            prop_assert!([-2i8, 0, 2].contains(&row.direction_delta));
        }
        for pair in rows.windows(2) {
            prop_assert_eq!(pair[1].direction_delta, pair[1].direction - pair[0].direction);
        }
    }

    /// Same input, same answer.
    #[test]
    fn detection_is_deterministic(
        steps in prop::collection::vec((-2.0f64..2.0, 0.01f64..1.5), 20..150),
    ) {
        let candles = random_walk(&steps);
        let detector = ReversalDetector::default();
        let first = detector.detect("EURUSD", candles.clone());
        let second = detector.detect("EURUSD", candles.clone());
        prop_assert_eq!(&first, &second);

        let rows = detector.indicator_rows(&PriceSeries::new(candles));
        prop_assert_eq!(first.map(|s| s.action), classify(&rows));
    }
}
