use async_trait::async_trait;

use crate::{OutcomeStatus, Placement, Result, TradeAction, TradeOutcome};

/// Abstraction over the binary-options broker connection.
///
/// `PocketOptionClient` implements this for live (and broker-demo) trading.
/// `PaperBroker` implements this for local simulation.
///
/// Only the trade executor in `crates/engine` places orders; the cycle
/// orchestrator reads the payout feed.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Open the broker session. Calling it on an open session is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Close the broker session. Calling it on a closed session is a no-op.
    async fn disconnect(&self) -> Result<()>;

    /// Place a binary option of `stake` on `pair` expiring after `expiry_secs`.
    async fn place_order(
        &self,
        stake: f64,
        pair: &str,
        action: TradeAction,
        expiry_secs: u64,
    ) -> Result<Placement>;

    /// Ask the broker whether the trade has settled.
    async fn poll_outcome(&self, trade_id: &str) -> Result<OutcomeStatus>;

    /// Latest raw payout snapshot, refreshed out-of-band by the session.
    /// `None` until the broker has published one.
    async fn payout_feed(&self) -> Option<String>;
}

/// One trade attempt: place, wait for expiry, report the outcome.
///
/// Returns `None` when the order could not be placed; the caller must not
/// retry the same attempt.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute(
        &self,
        stake: f64,
        pair: &str,
        action: TradeAction,
        expiry_secs: u64,
    ) -> Option<TradeOutcome>;
}
