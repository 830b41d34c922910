use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Error, Result, TradingMode};

/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Broker session
    pub po_ssid: String,
    pub po_demo: bool,

    // Market data
    pub oanda_token: String,
    pub oanda_account_id: String,
    /// OANDA practice host when true, trade host otherwise. Independent of `po_demo`.
    pub oanda_practice: bool,

    // Trading
    pub trading_mode: TradingMode,
    pub trading: TradingConfig,

    /// Payout table served by the paper broker, `(symbol, payout %)`.
    pub paper_payouts: Vec<(String, f64)>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match optional_env("TRADING_MODE")
            .unwrap_or_else(|| "paper".to_string())
            .to_lowercase()
            .as_str()
        {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => panic!("ERROR: TRADING_MODE must be 'paper' or 'live', got: '{other}'"),
        };

        let po_ssid = match trading_mode {
            TradingMode::Live => required_env("PO_SSID"),
            TradingMode::Paper => optional_env("PO_SSID").unwrap_or_default(),
        };

        let trading = match optional_env("TRADING_CONFIG_PATH") {
            Some(path) => {
                let trading = TradingConfig::load(&path)
                    .unwrap_or_else(|e| panic!("Failed to load trading config at '{path}': {e}"));
                info!(%path, "Loaded trading config");
                trading
            }
            None => TradingConfig::default(),
        };
        if let Err(e) = trading.validate() {
            panic!("Invalid trading config: {e}");
        }

        let paper_payouts = optional_env("PAPER_PAYOUTS")
            .map(|raw| {
                parse_payouts(&raw).unwrap_or_else(|e| panic!("PAPER_PAYOUTS is invalid: {e}"))
            })
            .unwrap_or_else(default_paper_payouts);

        Config {
            po_ssid,
            po_demo: optional_env("PO_DEMO")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            oanda_token: required_env("OANDA_TOKEN"),
            oanda_account_id: optional_env("OANDA_ID").unwrap_or_default(),
            oanda_practice: parse_oanda_env(optional_env("OANDA_ENV").as_deref())
                .unwrap_or_else(|e| panic!("OANDA_ENV is invalid: {e}")),
            trading_mode,
            trading,
            paper_payouts,
        }
    }
}

/// Strategy and money-management constants.
///
/// Example `config/trading.toml`:
/// ```toml
/// min_payout = 60.0
/// period_secs = 60
/// expiry_secs = 60
/// base_stake = 1.0
/// martingale_levels = 3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Minimum broker payout (percent) for an instrument to be traded.
    pub min_payout: f64,
    /// Candle width in seconds. Must be a whole number of minutes.
    pub period_secs: u64,
    /// Option expiry in seconds.
    pub expiry_secs: u64,
    /// Stake of the first ladder level.
    pub base_stake: f64,
    /// Maximum number of attempts in one martingale ladder.
    pub martingale_levels: u32,
    /// How long before the candle boundary the scan starts.
    pub pre_close_lead_secs: u64,
    /// Candles requested per instrument per cycle.
    pub candle_count: usize,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_payout: 60.0,
            period_secs: 60,
            expiry_secs: 60,
            base_stake: 1.0,
            martingale_levels: 3,
            pre_close_lead_secs: 15,
            candle_count: 500,
        }
    }
}

impl TradingConfig {
    /// Load from a TOML file. Missing keys fall back to the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_secs == 0 || self.period_secs % 60 != 0 {
            return Err(Error::Config(format!(
                "period_secs must be a positive multiple of 60, got {}",
                self.period_secs
            )));
        }
        if self.expiry_secs == 0 {
            return Err(Error::Config("expiry_secs must be positive".into()));
        }
        if self.base_stake <= 0.0 || !self.base_stake.is_finite() {
            return Err(Error::Config(format!(
                "base_stake must be positive, got {}",
                self.base_stake
            )));
        }
        if self.martingale_levels == 0 {
            return Err(Error::Config("martingale_levels must be at least 1".into()));
        }
        if self.pre_close_lead_secs >= self.period_secs {
            return Err(Error::Config(format!(
                "pre_close_lead_secs ({}) must be shorter than the period ({})",
                self.pre_close_lead_secs, self.period_secs
            )));
        }
        Ok(())
    }
}

/// Parse `EURUSD:80,GBPUSD:75` into a payout table.
pub fn parse_payouts(raw: &str) -> Result<Vec<(String, f64)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (symbol, payout) = entry
                .split_once(':')
                .ok_or_else(|| Error::Config(format!("expected SYMBOL:PAYOUT, got '{entry}'")))?;
            let payout = payout
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::Config(format!("non-numeric payout in '{entry}'")))?;
            Ok((symbol.trim().to_uppercase(), payout))
        })
        .collect()
}

fn default_paper_payouts() -> Vec<(String, f64)> {
    [("EURUSD", 80.0), ("GBPUSD", 78.0), ("USDJPY", 75.0), ("AUDUSD", 70.0)]
        .into_iter()
        .map(|(s, p)| (s.to_string(), p))
        .collect()
}

/// `OANDA_ENV`: `practice` (default) or `live`. Returns whether the practice host is used.
pub fn parse_oanda_env(raw: Option<&str>) -> Result<bool> {
    match raw.map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("practice") => Ok(true),
        Some("live") | Some("trade") => Ok(false),
        Some(other) => Err(Error::Config(format!(
            "expected 'practice' or 'live', got '{other}'"
        ))),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
