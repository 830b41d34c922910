use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{Candle, Error, MarketData, Result};

const PRACTICE_URL: &str = "https://api-fxpractice.oanda.com";
const TRADE_URL: &str = "https://api-fxtrade.oanda.com";

/// REST v20 client for OANDA instrument candles (mid prices).
pub struct OandaClient {
    token: String,
    base_url: String,
    http: Client,
}

impl OandaClient {
    pub fn new(token: impl Into<String>, practice: bool) -> Result<Self> {
        let base_url = if practice { PRACTICE_URL } else { TRADE_URL };
        Self::with_base_url(token, base_url)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            token: token.into(),
            base_url: base_url.into(),
            http,
        })
    }
}

#[async_trait]
impl MarketData for OandaClient {
    async fn fetch_candles(&self, pair: &str, period_secs: u64, count: usize) -> Result<Vec<Candle>> {
        let instrument = provider_symbol(pair)?;
        let granularity = granularity_for(period_secs)?;
        let url = format!("{}/v3/instruments/{instrument}/candles", self.base_url);

        debug!(%instrument, granularity, count, "Fetching OANDA candles");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("granularity", granularity.to_string()),
                ("count", count.to_string()),
                ("price", "M".to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::MarketData(format!("HTTP {status}: {body}")));
        }

        parse_candles(&body)
    }
}

/// `EURUSD` → `EUR_USD`. Only contiguous six-letter pairs are accepted.
pub fn provider_symbol(pair: &str) -> Result<String> {
    if pair.len() != 6 || !pair.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::Symbol(pair.to_string()));
    }
    Ok(format!("{}_{}", &pair[..3], &pair[3..]).to_uppercase())
}

/// OANDA granularity code for a candle width in seconds.
pub fn granularity_for(period_secs: u64) -> Result<&'static str> {
    let code = match period_secs {
        5 => "S5",
        10 => "S10",
        15 => "S15",
        30 => "S30",
        60 => "M1",
        120 => "M2",
        240 => "M4",
        300 => "M5",
        600 => "M10",
        900 => "M15",
        1800 => "M30",
        3600 => "H1",
        7200 => "H2",
        10800 => "H3",
        14400 => "H4",
        21600 => "H6",
        28800 => "H8",
        43200 => "H12",
        86400 => "D",
        other => {
            return Err(Error::Config(format!(
                "no OANDA granularity for a {other}s candle"
            )))
        }
    };
    Ok(code)
}

/// Parse a `/candles` response body into candles, oldest first.
pub fn parse_candles(body: &str) -> Result<Vec<Candle>> {
    let resp: CandlesResponse = serde_json::from_str(body)?;
    resp.candles
        .into_iter()
        .map(|c| {
            let mid = c
                .mid
                .ok_or_else(|| Error::MarketData(format!("candle at {} has no mid prices", c.time)))?;
            Ok(Candle {
                timestamp: c.time,
                open: parse_price(&mid.o)?,
                high: parse_price(&mid.h)?,
                low: parse_price(&mid.l)?,
                close: parse_price(&mid.c)?,
            })
        })
        .collect()
}

fn parse_price(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| Error::MarketData(format!("invalid price '{raw}'")))
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CandlesResponse {
    candles: Vec<CandleEntry>,
}

#[derive(Deserialize)]
struct CandleEntry {
    time: DateTime<Utc>,
    mid: Option<MidPrices>,
}

#[derive(Deserialize)]
struct MidPrices {
    o: String,
    h: String,
    l: String,
    c: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_follows_practice_flag() {
        assert_eq!(OandaClient::new("token", true).unwrap().base_url, PRACTICE_URL);
        assert_eq!(OandaClient::new("token", false).unwrap().base_url, TRADE_URL);
    }

    #[test]
    fn maps_contiguous_pair_to_delimited_instrument() {
        assert_eq!(provider_symbol("EURUSD").unwrap(), "EUR_USD");
        assert_eq!(provider_symbol("gbpjpy").unwrap(), "GBP_JPY");
    }

    #[test]
    fn rejects_non_pair_symbols() {
        assert!(matches!(provider_symbol("EURUSD_otc"), Err(Error::Symbol(_))));
        assert!(provider_symbol("EUR_USD").is_err());
        assert!(provider_symbol("#AAPL").is_err());
    }

    #[test]
    fn granularity_follows_period() {
        assert_eq!(granularity_for(60).unwrap(), "M1");
        assert_eq!(granularity_for(300).unwrap(), "M5");
        assert_eq!(granularity_for(3600).unwrap(), "H1");
        assert!(granularity_for(420).is_err());
    }

    #[test]
    fn parses_candles_response() {
        let body = r#"{
            "instrument": "EUR_USD",
            "granularity": "M1",
            "candles": [
                {"complete": true, "volume": 42, "time": "2024-03-04T12:00:00.000000000Z",
                 "mid": {"o": "1.08510", "h": "1.08530", "l": "1.08490", "c": "1.08520"}},
                {"complete": false, "volume": 7, "time": "2024-03-04T12:01:00.000000000Z",
                 "mid": {"o": "1.08520", "h": "1.08540", "l": "1.08515", "c": "1.08535"}}
            ]
        }"#;

        let candles = parse_candles(body).unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 1.08510);
        assert_eq!(candles[1].close, 1.08535);
        assert!(candles[0].timestamp < candles[1].timestamp);
    }

    #[test]
    fn rejects_non_numeric_prices() {
        let body = r#"{"candles": [{"time": "2024-03-04T12:00:00Z",
            "mid": {"o": "x", "h": "1", "l": "1", "c": "1"}}]}"#;
        assert!(matches!(parse_candles(body), Err(Error::MarketData(_))));
    }
}
