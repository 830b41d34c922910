use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use common::{
    BrokerClient, Clock, OutcomeStatus, TradeAction, TradeExecutor, TradeOutcome,
};

/// Pause between the forced disconnect and the reconnect after a failed placement.
pub const RECONNECT_PAUSE: Duration = Duration::from_secs(2);

/// Pause between outcome polls while the broker still reports the trade as open.
pub const OUTCOME_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Places one binary option on the broker and waits for it to settle.
///
/// This is the ONLY component that calls `BrokerClient::place_order`.
pub struct BrokerExecutor {
    broker: Arc<dyn BrokerClient>,
    clock: Arc<dyn Clock>,
}

impl BrokerExecutor {
    pub fn new(broker: Arc<dyn BrokerClient>, clock: Arc<dyn Clock>) -> Self {
        Self { broker, clock }
    }

    /// Drop and re-open the broker session after a failed placement.
    async fn reconnect(&self) {
        if let Err(e) = self.broker.disconnect().await {
            warn!(error = %e, "Broker disconnect failed");
        }
        self.clock.sleep(RECONNECT_PAUSE).await;
        match self.broker.connect().await {
            Ok(()) => info!("Broker session re-established"),
            Err(e) => error!(error = %e, "Broker reconnect failed"),
        }
    }

    async fn await_outcome(&self, trade_id: &str) -> TradeOutcome {
        loop {
            match self.broker.poll_outcome(trade_id).await {
                Ok(OutcomeStatus::Closed(result)) => {
                    return TradeOutcome {
                        trade_id: trade_id.to_string(),
                        result,
                    }
                }
                Ok(OutcomeStatus::Pending) => {}
                Err(e) => warn!(trade_id, error = %e, "Outcome poll failed, retrying"),
            }
            self.clock.sleep(OUTCOME_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl TradeExecutor for BrokerExecutor {
    async fn execute(
        &self,
        stake: f64,
        pair: &str,
        action: TradeAction,
        expiry_secs: u64,
    ) -> Option<TradeOutcome> {
        info!(pair, %action, stake, expiry_secs, "Executing trade");

        let trade_id = match self.broker.place_order(stake, pair, action, expiry_secs).await {
            Ok(placement) => placement.confirmed_id().map(str::to_string),
            Err(e) => {
                error!(pair, error = %e, "Order placement errored");
                None
            }
        };

        let Some(trade_id) = trade_id else {
            error!(pair, "Trade failed to execute, attempting reconnection");
            self.reconnect().await;
            return None;
        };

        info!(pair, trade_id = %trade_id, "Trade placed, waiting for expiry");
        self.clock.sleep(Duration::from_secs(expiry_secs)).await;

        let outcome = self.await_outcome(&trade_id).await;
        info!(pair, trade_id = %outcome.trade_id, result = %outcome.result, "Trade settled");
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};
    use common::{Error, ManualClock, Placement, Result, TradeResult};

    #[derive(Default)]
    struct FakeBroker {
        placement: Mutex<Option<Result<Placement>>>,
        polls: Mutex<VecDeque<Result<OutcomeStatus>>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeBroker {
        fn placing(placement: Result<Placement>) -> Self {
            Self {
                placement: Mutex::new(Some(placement)),
                ..Self::default()
            }
        }

        fn with_polls(self, polls: Vec<Result<OutcomeStatus>>) -> Self {
            *self.polls.lock().unwrap() = polls.into();
            self
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrokerClient for FakeBroker {
        async fn connect(&self) -> Result<()> {
            self.calls.lock().unwrap().push("connect");
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.calls.lock().unwrap().push("disconnect");
            Ok(())
        }

        async fn place_order(&self, _: f64, _: &str, _: TradeAction, _: u64) -> Result<Placement> {
            self.calls.lock().unwrap().push("place");
            self.placement
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(Placement::rejected()))
        }

        async fn poll_outcome(&self, _: &str) -> Result<OutcomeStatus> {
            self.calls.lock().unwrap().push("poll");
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(OutcomeStatus::Closed(TradeResult::Loss)))
        }

        async fn payout_feed(&self) -> Option<String> {
            None
        }
    }

    fn setup(broker: FakeBroker) -> (BrokerExecutor, Arc<FakeBroker>, Arc<ManualClock>) {
        let broker = Arc::new(broker);
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 2, 12, 1, 0).unwrap()));
        (BrokerExecutor::new(broker.clone(), clock.clone()), broker, clock)
    }

    #[tokio::test]
    async fn waits_full_expiry_then_reports_outcome() {
        let broker = FakeBroker::placing(Ok(Placement::accepted("t-1")))
            .with_polls(vec![Ok(OutcomeStatus::Closed(TradeResult::Win))]);
        let (executor, broker, clock) = setup(broker);

        let outcome = executor.execute(1.0, "EURUSD", TradeAction::Call, 60).await;

        assert_eq!(
            outcome,
            Some(TradeOutcome { trade_id: "t-1".into(), result: TradeResult::Win })
        );
        assert_eq!(clock.total_slept(), Duration::from_secs(60));
        assert_eq!(broker.calls(), vec!["place", "poll"]);
    }

    #[tokio::test]
    async fn pending_and_failed_polls_are_retried() {
        let broker = FakeBroker::placing(Ok(Placement::accepted("t-2"))).with_polls(vec![
            Ok(OutcomeStatus::Pending),
            Err(Error::Broker("timeout".into())),
            Ok(OutcomeStatus::Closed(TradeResult::Loss)),
        ]);
        let (executor, broker, clock) = setup(broker);

        let outcome = executor.execute(2.0, "EURUSD", TradeAction::Put, 60).await.unwrap();

        assert_eq!(outcome.result, TradeResult::Loss);
        assert_eq!(broker.calls(), vec!["place", "poll", "poll", "poll"]);
        assert_eq!(clock.total_slept(), Duration::from_secs(62));
    }

    #[tokio::test]
    async fn missing_trade_id_reconnects_and_aborts() {
        let placement = Placement { accepted: true, trade_id: None };
        let (executor, broker, clock) = setup(FakeBroker::placing(Ok(placement)));

        let outcome = executor.execute(1.0, "EURUSD", TradeAction::Call, 60).await;

        assert!(outcome.is_none());
        assert_eq!(broker.calls(), vec!["place", "disconnect", "connect"]);
        assert_eq!(clock.total_slept(), RECONNECT_PAUSE);
    }

    #[tokio::test]
    async fn placement_error_reconnects_and_aborts() {
        let (executor, broker, _clock) =
            setup(FakeBroker::placing(Err(Error::Broker("socket closed".into()))));

        let outcome = executor.execute(1.0, "EURUSD", TradeAction::Call, 60).await;

        assert!(outcome.is_none());
        assert_eq!(broker.calls(), vec!["place", "disconnect", "connect"]);
    }
}
