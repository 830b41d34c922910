use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{
    BrokerClient, Clock, Error, MarketData, OutcomeStatus, Placement, Result, TradeAction,
    TradeResult,
};

/// Candles requested when sampling the latest price.
const PRICE_SAMPLE: usize = 2;

#[derive(Debug, Clone)]
struct PaperTrade {
    pair: String,
    action: TradeAction,
    stake: f64,
    payout_percent: f64,
    entry_price: f64,
    expires_at: DateTime<Utc>,
    settled: Option<TradeResult>,
}

/// Simulated binary-options broker for paper trading.
///
/// Entry and exit prices are the latest close from the market-data provider.
/// No real orders are ever sent to PocketOption.
pub struct PaperBroker {
    market: Arc<dyn MarketData>,
    clock: Arc<dyn Clock>,
    period_secs: u64,
    /// Configured payout per pair, in feed order.
    payouts: Vec<(String, f64)>,
    /// Simulated account balance.
    balance: Arc<RwLock<f64>>,
    trades: RwLock<HashMap<String, PaperTrade>>,
    connected: RwLock<bool>,
}

impl PaperBroker {
    pub fn new(
        market: Arc<dyn MarketData>,
        clock: Arc<dyn Clock>,
        payouts: Vec<(String, f64)>,
        initial_balance: f64,
        period_secs: u64,
    ) -> Self {
        info!(
            balance = initial_balance,
            pairs = payouts.len(),
            "PaperBroker initialized"
        );
        Self {
            market,
            clock,
            period_secs,
            payouts,
            balance: Arc::new(RwLock::new(initial_balance)),
            trades: RwLock::new(HashMap::new()),
            connected: RwLock::new(false),
        }
    }

    pub async fn balance(&self) -> f64 {
        *self.balance.read().await
    }

    async fn latest_close(&self, pair: &str) -> Result<f64> {
        let candles = self
            .market
            .fetch_candles(pair, self.period_secs, PRICE_SAMPLE)
            .await?;
        candles
            .last()
            .map(|c| c.close)
            .ok_or_else(|| Error::MarketData(format!("no price available for {pair}")))
    }

    fn payout_for(&self, pair: &str) -> Option<f64> {
        self.payouts
            .iter()
            .find(|(p, _)| p == pair)
            .map(|(_, payout)| *payout)
    }

    async fn ensure_connected(&self) -> Result<()> {
        if *self.connected.read().await {
            Ok(())
        } else {
            Err(Error::Broker("paper session not connected".into()))
        }
    }
}

/// Call wins above the entry, put wins below it; an unchanged price is not a loss.
fn settle(action: TradeAction, entry: f64, exit: f64) -> TradeResult {
    let lost = match action {
        TradeAction::Call => exit < entry,
        TradeAction::Put => exit > entry,
    };
    if lost {
        TradeResult::Loss
    } else {
        TradeResult::Win
    }
}

/// One record in the broker's fixed-position payout layout.
fn feed_record(idx: usize, pair: &str, payout: f64, updated_at: i64) -> Value {
    json!([idx, pair, pair, "currency", 2, payout, 60, 30, 3, 0, 170, 0, [], updated_at, true])
}

#[async_trait]
impl BrokerClient for PaperBroker {
    async fn connect(&self) -> Result<()> {
        *self.connected.write().await = true;
        debug!("Paper session opened");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.connected.write().await = false;
        debug!("Paper session closed");
        Ok(())
    }

    async fn place_order(
        &self,
        stake: f64,
        pair: &str,
        action: TradeAction,
        expiry_secs: u64,
    ) -> Result<Placement> {
        self.ensure_connected().await?;

        let Some(payout_percent) = self.payout_for(pair) else {
            warn!(pair, "Paper order rejected: pair not tradable");
            return Ok(Placement::rejected());
        };

        {
            let mut balance = self.balance.write().await;
            if stake <= 0.0 || stake > *balance {
                warn!(pair, stake, balance = *balance, "Paper order rejected: insufficient balance");
                return Ok(Placement::rejected());
            }
            *balance -= stake;
        }

        let entry_price = match self.latest_close(pair).await {
            Ok(price) => price,
            Err(e) => {
                *self.balance.write().await += stake;
                return Err(e);
            }
        };

        let trade_id = Uuid::new_v4().to_string();
        let expires_at = self.clock.now() + chrono::Duration::seconds(expiry_secs as i64);
        debug!(pair, %action, stake, entry = entry_price, %trade_id, "Paper option opened");

        self.trades.write().await.insert(
            trade_id.clone(),
            PaperTrade {
                pair: pair.to_string(),
                action,
                stake,
                payout_percent,
                entry_price,
                expires_at,
                settled: None,
            },
        );

        Ok(Placement::accepted(trade_id))
    }

    async fn poll_outcome(&self, trade_id: &str) -> Result<OutcomeStatus> {
        let trade = self
            .trades
            .read()
            .await
            .get(trade_id)
            .cloned()
            .ok_or_else(|| Error::Broker(format!("unknown paper trade {trade_id}")))?;

        if let Some(result) = trade.settled {
            return Ok(OutcomeStatus::Closed(result));
        }
        if self.clock.now() < trade.expires_at {
            return Ok(OutcomeStatus::Pending);
        }

        let exit_price = self.latest_close(&trade.pair).await?;
        let result = settle(trade.action, trade.entry_price, exit_price);
        if result == TradeResult::Win {
            *self.balance.write().await += trade.stake * (1.0 + trade.payout_percent / 100.0);
        }

        if let Some(stored) = self.trades.write().await.get_mut(trade_id) {
            stored.settled = Some(result);
        }
        let balance = self.balance().await;
        info!(
            pair = %trade.pair,
            %trade_id,
            entry = trade.entry_price,
            exit = exit_price,
            %result,
            balance,
            "Paper option settled"
        );
        Ok(OutcomeStatus::Closed(result))
    }

    async fn payout_feed(&self) -> Option<String> {
        if !*self.connected.read().await {
            return None;
        }
        let updated_at = self.clock.now().timestamp();
        let records: Vec<Value> = self
            .payouts
            .iter()
            .enumerate()
            .map(|(idx, (pair, payout))| feed_record(idx + 1, pair, *payout, updated_at))
            .collect();
        Some(Value::Array(records).to_string())
    }
}
