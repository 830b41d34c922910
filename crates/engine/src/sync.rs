use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};

use common::{Clock, Error, Result};

/// Polling step of both waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Blocks the trading cycle until fixed points of the candle grid.
///
/// Both waits poll the clock; they are plain futures, so dropping them (for
/// example from a `tokio::select!` on shutdown) cancels the wait.
#[derive(Clone)]
pub struct CandleSync {
    clock: Arc<dyn Clock>,
}

impl CandleSync {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Wait until `lead_secs` before the next `period_secs` boundary.
    /// Returns immediately when already inside that window.
    pub async fn wait_until_pre_close(&self, period_secs: u64, lead_secs: u64) {
        while !in_pre_close(self.clock.now(), period_secs, lead_secs) {
            self.clock.sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait for second 0 of a minute that is a multiple of `period_secs / 60`.
    pub async fn wait_for_exact_open(&self, period_secs: u64) -> Result<()> {
        let period_minutes = minute_period(period_secs)?;
        while !is_exact_open(self.clock.now(), period_minutes) {
            self.clock.sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }
}

/// Smallest multiple of `period_secs` (from the Unix epoch) at or after `now`.
pub fn next_boundary(now: DateTime<Utc>, period_secs: u64) -> DateTime<Utc> {
    let period_ms = (period_secs.max(1) * 1000) as i64;
    let now_ms = now.timestamp_millis();
    let boundary_ms = now_ms.div_euclid(period_ms) * period_ms
        + if now_ms.rem_euclid(period_ms) == 0 { 0 } else { period_ms };
    DateTime::from_timestamp_millis(boundary_ms).unwrap_or(now)
}

fn in_pre_close(now: DateTime<Utc>, period_secs: u64, lead_secs: u64) -> bool {
    let boundary = next_boundary(now, period_secs);
    now >= boundary - chrono::Duration::seconds(lead_secs as i64)
}

fn is_exact_open(now: DateTime<Utc>, period_minutes: u32) -> bool {
    now.second() == 0 && now.minute() % period_minutes == 0
}

fn minute_period(period_secs: u64) -> Result<u32> {
    if period_secs == 0 || period_secs % 60 != 0 {
        return Err(Error::Config(format!(
            "exact candle open needs a whole-minute period, got {period_secs}s"
        )));
    }
    Ok((period_secs / 60) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::ManualClock;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
    }

    fn sync_at(start: DateTime<Utc>) -> (CandleSync, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        (CandleSync::new(clock.clone()), clock)
    }

    #[test]
    fn boundary_rounds_up_to_period() {
        assert_eq!(next_boundary(at(12, 0, 10), 60), at(12, 1, 0));
        assert_eq!(next_boundary(at(12, 3, 10), 300), at(12, 5, 0));
        assert_eq!(next_boundary(at(12, 5, 0), 300), at(12, 5, 0));
    }

    #[tokio::test]
    async fn pre_close_returns_lead_seconds_before_boundary() {
        let (sync, clock) = sync_at(at(12, 0, 10));

        sync.wait_until_pre_close(60, 15).await;

        assert_eq!(clock.now(), at(12, 0, 45));
    }

    #[tokio::test]
    async fn pre_close_returns_immediately_inside_window() {
        let (sync, clock) = sync_at(at(12, 0, 50));

        sync.wait_until_pre_close(60, 15).await;

        assert_eq!(clock.now(), at(12, 0, 50));
        assert_eq!(clock.total_slept(), Duration::ZERO);
    }

    #[tokio::test]
    async fn pre_close_with_five_minute_period() {
        let (sync, clock) = sync_at(at(12, 1, 0));

        sync.wait_until_pre_close(300, 15).await;

        assert_eq!(clock.now(), at(12, 4, 45));
    }

    #[tokio::test]
    async fn exact_open_waits_for_next_minute() {
        let (sync, clock) = sync_at(at(12, 0, 45));

        sync.wait_for_exact_open(60).await.unwrap();

        assert_eq!(clock.now(), at(12, 1, 0));
    }

    #[tokio::test]
    async fn exact_open_respects_multi_minute_period() {
        let (sync, clock) = sync_at(at(12, 1, 30));

        sync.wait_for_exact_open(300).await.unwrap();

        assert_eq!(clock.now(), at(12, 5, 0));
    }

    #[tokio::test]
    async fn exact_open_rejects_sub_minute_period() {
        let (sync, clock) = sync_at(at(12, 0, 45));

        let result = sync.wait_for_exact_open(90).await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(clock.total_slept(), Duration::ZERO);
    }
}
