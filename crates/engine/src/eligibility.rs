use serde_json::Value;
use tracing::{debug, error, info};

use common::{EligibleInstrument, Error, Result};

// Positions inside one PocketOption asset record.
const NAME_IDX: usize = 1;
const ASSET_CLASS_IDX: usize = 3;
const PAYOUT_IDX: usize = 5;
const ACTIVE_IDX: usize = 14;

const OTC_SUFFIX: &str = "_otc";
const CURRENCY_CLASS: &str = "currency";

/// One instrument record from the broker payout table.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutEntry {
    pub name: String,
    pub asset_class: String,
    pub payout_percent: f64,
    pub active: bool,
}

impl PayoutEntry {
    fn from_record(record: &Value) -> Result<Self> {
        let fields = record
            .as_array()
            .ok_or_else(|| Error::Broker(format!("payout record is not an array: {record}")))?;
        let field = |idx: usize| {
            fields
                .get(idx)
                .ok_or_else(|| Error::Broker(format!("payout record has no field {idx}")))
        };

        Ok(Self {
            name: field(NAME_IDX)?
                .as_str()
                .ok_or_else(|| Error::Broker("payout record name is not a string".into()))?
                .to_string(),
            asset_class: field(ASSET_CLASS_IDX)?
                .as_str()
                .ok_or_else(|| Error::Broker("payout record asset class is not a string".into()))?
                .to_string(),
            payout_percent: field(PAYOUT_IDX)?
                .as_f64()
                .ok_or_else(|| Error::Broker("payout record payout is not a number".into()))?,
            active: field(ACTIVE_IDX)?
                .as_bool()
                .ok_or_else(|| Error::Broker("payout record active flag is not a bool".into()))?,
        })
    }

    fn is_eligible(&self, min_payout: f64) -> bool {
        !self.name.ends_with(OTC_SUFFIX)
            && self.asset_class == CURRENCY_CLASS
            && self.active
            && self.payout_percent >= min_payout
    }
}

/// Parse the raw `updateAssets` payload: a JSON array of fixed-position records.
pub fn parse_feed(raw: &str) -> Result<Vec<PayoutEntry>> {
    let value: Value = serde_json::from_str(raw)?;
    let records = value
        .as_array()
        .ok_or_else(|| Error::Broker("payout feed is not an array".into()))?;
    records.iter().map(PayoutEntry::from_record).collect()
}

/// Instruments currently worth trading, in the order they first became eligible.
///
/// Owned by the cycle orchestrator; `refresh` is the only writer.
#[derive(Debug, Clone)]
pub struct EligibleSet {
    min_payout: f64,
    instruments: Vec<EligibleInstrument>,
}

impl EligibleSet {
    pub fn new(min_payout: f64) -> Self {
        Self {
            min_payout,
            instruments: Vec::new(),
        }
    }

    /// Apply a raw payout feed. Returns `false` and leaves the set untouched
    /// when the feed cannot be parsed.
    pub fn refresh(&mut self, raw_feed: &str) -> bool {
        let entries = match parse_feed(raw_feed) {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Failed to parse payout data");
                return false;
            }
        };

        for entry in entries {
            if entry.is_eligible(self.min_payout) {
                self.upsert(entry);
            } else if let Some(idx) = self.position(&entry.name) {
                let removed = self.instruments.remove(idx);
                info!(pair = %removed.symbol, payout = entry.payout_percent, active = entry.active, "Pair no longer eligible");
            }
        }
        debug!(eligible = self.instruments.len(), "Eligible set refreshed");
        true
    }

    pub fn symbols(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.symbol.clone()).collect()
    }

    pub fn get(&self, symbol: &str) -> Option<&EligibleInstrument> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    fn position(&self, symbol: &str) -> Option<usize> {
        self.instruments.iter().position(|i| i.symbol == symbol)
    }

    fn upsert(&mut self, entry: PayoutEntry) {
        match self.position(&entry.name) {
            Some(idx) => self.instruments[idx].payout_percent = entry.payout_percent,
            None => {
                info!(pair = %entry.name, payout = entry.payout_percent, "Pair became eligible");
                self.instruments.push(EligibleInstrument {
                    symbol: entry.name,
                    payout_percent: entry.payout_percent,
                    asset_class: entry.asset_class,
                });
            }
        }
    }
}
