use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{BrokerClient, Clock, Config, MarketData, SystemClock, TradingMode};
use engine::{BrokerExecutor, Engine, EngineParts, OandaClient, PocketOptionClient};
use paper::PaperBroker;
use strategy::ReversalDetector;

/// Time given to a fresh broker session to authenticate and publish payouts.
const SESSION_SETTLE: Duration = Duration::from_secs(5);

/// Starting balance of the simulated account.
const PAPER_BALANCE: f64 = 1_000.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(
        mode = %cfg.trading_mode,
        demo = cfg.po_demo,
        oanda_practice = cfg.oanda_practice,
        "ReversalBot starting"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // ── Market data ───────────────────────────────────────────────────────────
    let market: Arc<dyn MarketData> = Arc::new(
        OandaClient::new(&cfg.oanda_token, cfg.oanda_practice).context("building OANDA client")?,
    );

    // ── Broker (injected based on TRADING_MODE) ───────────────────────────────
    let broker: Arc<dyn BrokerClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode, using PocketOptionClient");
            Arc::new(PocketOptionClient::new(&cfg.po_ssid, cfg.po_demo))
        }
        TradingMode::Paper => {
            info!(pairs = cfg.paper_payouts.len(), "Paper trading mode, using PaperBroker");
            Arc::new(PaperBroker::new(
                market.clone(),
                clock.clone(),
                cfg.paper_payouts.clone(),
                PAPER_BALANCE,
                cfg.trading.period_secs,
            ))
        }
    };

    broker
        .connect()
        .await
        .context("connecting to broker")?;
    info!("Broker connected, waiting for session to settle");
    tokio::time::sleep(SESSION_SETTLE).await;

    // ── Engine ────────────────────────────────────────────────────────────────
    let executor = Arc::new(BrokerExecutor::new(broker.clone(), clock.clone()));
    let (engine, handle) = Engine::new(
        cfg.trading.clone(),
        EngineParts {
            broker: broker.clone(),
            market,
            detector: Arc::new(ReversalDetector::default()),
            executor,
            clock,
        },
    )
    .context("building engine")?;
    let engine_task = tokio::spawn(engine.run());

    info!("Trading loop started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("Shutdown signal received");

    handle.shutdown();
    if let Err(e) = engine_task.await {
        warn!(error = %e, "Engine task ended abnormally");
    }
    broker.disconnect().await.context("closing broker session")?;

    info!("Exiting.");
    Ok(())
}
