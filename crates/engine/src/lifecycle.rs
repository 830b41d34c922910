use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use common::{BrokerClient, Clock, MarketData, Result, Signal, TradeExecutor, TradingConfig};
use risk::{LadderReport, MartingaleConfig, MartingaleController};
use strategy::SignalDetector;

use crate::eligibility::EligibleSet;
use crate::sync::CandleSync;

/// Pause before retrying a cycle when the payout feed is missing or unreadable.
pub const FEED_RETRY_PAUSE: Duration = Duration::from_secs(5);

/// Pause at the end of every completed cycle.
pub const CYCLE_PAUSE: Duration = Duration::from_secs(1);

/// How a single trading cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    FeedUnavailable,
    NoSignal,
    Traded(LadderReport),
}

/// Cloneable handle used by the binary to stop the engine.
#[derive(Clone)]
pub struct EngineHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl EngineHandle {
    /// Stop the trading loop. Any in-flight wait is cancelled.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The collaborators the engine drives.
pub struct EngineParts {
    pub broker: Arc<dyn BrokerClient>,
    pub market: Arc<dyn MarketData>,
    pub detector: Arc<dyn SignalDetector>,
    pub executor: Arc<dyn TradeExecutor>,
    pub clock: Arc<dyn Clock>,
}

/// Sequential trading loop: refresh payouts, scan near candle close, trade at
/// the next open. One ladder at a time.
pub struct Engine {
    config: TradingConfig,
    broker: Arc<dyn BrokerClient>,
    market: Arc<dyn MarketData>,
    detector: Arc<dyn SignalDetector>,
    executor: Arc<dyn TradeExecutor>,
    clock: Arc<dyn Clock>,
    martingale: MartingaleController,
    sync: CandleSync,
    eligible: EligibleSet,
    shutdown_rx: watch::Receiver<bool>,
}

impl Engine {
    /// Fails when `config` does not pass `TradingConfig::validate`.
    pub fn new(config: TradingConfig, parts: EngineParts) -> Result<(Self, EngineHandle)> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let martingale = MartingaleController::new(MartingaleConfig {
            base_stake: config.base_stake,
            level_cap: config.martingale_levels,
            expiry_secs: config.expiry_secs,
        });

        let engine = Engine {
            eligible: EligibleSet::new(config.min_payout),
            sync: CandleSync::new(parts.clock.clone()),
            martingale,
            config,
            broker: parts.broker,
            market: parts.market,
            detector: parts.detector,
            executor: parts.executor,
            clock: parts.clock,
            shutdown_rx,
        };

        let handle = EngineHandle {
            shutdown_tx: Arc::new(shutdown_tx),
        };

        Ok((engine, handle))
    }

    pub fn eligible(&self) -> &EligibleSet {
        &self.eligible
    }

    /// Run cycles until the handle requests shutdown. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        let mut shutdown = self.shutdown_rx.clone();
        info!(
            detector = self.detector.name(),
            period_secs = self.config.period_secs,
            "Engine started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Shutdown requested, leaving trading loop");
                    break;
                }
                _ = self.cycle_or_pause() => {}
            }
        }

        info!("Engine stopped");
    }

    /// Run one cycle; a failed cycle is logged and followed by the retry pause.
    async fn cycle_or_pause(&mut self) {
        match self.run_cycle().await {
            Ok(outcome) => debug!(?outcome, "Cycle finished"),
            Err(e) => {
                error!(error = %e, "Cycle failed, retrying");
                self.clock.sleep(FEED_RETRY_PAUSE).await;
            }
        }
    }

    /// One full trading cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        info!("Starting new trading cycle");

        if !self.refresh_payouts().await {
            self.clock.sleep(FEED_RETRY_PAUSE).await;
            return Ok(CycleOutcome::FeedUnavailable);
        }

        let period = self.config.period_secs;
        self.sync
            .wait_until_pre_close(period, self.config.pre_close_lead_secs)
            .await;

        let signal = self.scan().await;

        self.sync.wait_for_exact_open(period).await?;

        let outcome = match signal {
            Some(signal) => {
                let report = self.martingale.run(self.executor.as_ref(), &signal).await;
                CycleOutcome::Traded(report)
            }
            None => {
                info!("No signal this cycle");
                CycleOutcome::NoSignal
            }
        };

        self.clock.sleep(CYCLE_PAUSE).await;
        Ok(outcome)
    }

    async fn refresh_payouts(&mut self) -> bool {
        match self.broker.payout_feed().await {
            Some(raw) => self.eligible.refresh(&raw),
            None => {
                error!("No payout data received from broker");
                // No-op while the session is open; revives a dropped one
                if let Err(e) = self.broker.connect().await {
                    warn!(error = %e, "Broker reconnect failed");
                }
                false
            }
        }
    }

    /// Scan eligible pairs in order and return the first signal.
    async fn scan(&self) -> Option<Signal> {
        let symbols = self.eligible.symbols();
        debug!(pairs = ?symbols, "Scanning eligible pairs");

        for symbol in symbols {
            let candles = match self
                .market
                .fetch_candles(&symbol, self.config.period_secs, self.config.candle_count)
                .await
            {
                Ok(candles) => candles,
                Err(e) => {
                    warn!(pair = %symbol, error = %e, "No data for pair, skipping");
                    continue;
                }
            };

            if let Some(signal) = self.detector.detect(&symbol, candles) {
                return Some(signal);
            }
        }
        None
    }
}
