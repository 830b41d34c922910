use serde::Deserialize;
use serde_json::{json, Value};

use common::{Error, Result, TradeAction, TradeResult};

/// Binary option type code for fixed-time trades.
const OPTION_TYPE_FIXED: u8 = 100;

/// Prefix byte some servers put in front of a binary attachment.
const BINARY_ATTACHMENT_PREFIX: u8 = 0x04;

/// One Engine.IO / Socket.IO text frame, as far as the client cares.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `0{...}`: transport opened, reply with `40`.
    Open,
    /// `40{...}`: namespace joined, authenticate.
    Connected,
    /// `2`: server ping, reply with `3`.
    Ping,
    /// `451-["event",{"_placeholder":true,...}]`: payload follows as a binary frame.
    BinaryHeader(String),
    /// `42["event",payload]`: inline event.
    Event(String, Value),
    Other,
}

pub fn parse_frame(text: &str) -> Frame {
    if text == "2" {
        return Frame::Ping;
    }
    if text.starts_with("40") {
        return Frame::Connected;
    }
    if text.starts_with('0') {
        return Frame::Open;
    }
    if let Some(rest) = text.strip_prefix("451-") {
        return match event_array(rest) {
            Some((name, _)) => Frame::BinaryHeader(name),
            None => Frame::Other,
        };
    }
    if let Some(rest) = text.strip_prefix("42") {
        if let Some((name, payload)) = event_array(rest) {
            return Frame::Event(name, payload);
        }
    }
    Frame::Other
}

fn event_array(raw: &str) -> Option<(String, Value)> {
    let Value::Array(mut items) = serde_json::from_str(raw).ok()? else {
        return None;
    };
    if items.is_empty() {
        return None;
    }
    let name = items.remove(0).as_str()?.to_string();
    let payload = items.into_iter().next().unwrap_or(Value::Null);
    Some((name, payload))
}

/// Strip the optional attachment prefix of a binary frame.
pub fn binary_payload(data: &[u8]) -> &[u8] {
    match data.split_first() {
        Some((&BINARY_ATTACHMENT_PREFIX, rest)) => rest,
        _ => data,
    }
}

/// Broker events the session reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// Raw `updateAssets` payload: the payout table.
    Assets(String),
    OrderOpened { request_id: u64, trade_id: String },
    OrderFailed { request_id: Option<u64>, reason: String },
    DealsClosed(Vec<(String, TradeResult)>),
}

/// Decode the payload of a named event. Unknown events yield `None`.
pub fn decode_event(name: &str, payload: &[u8]) -> Result<Option<BrokerEvent>> {
    let event = match name {
        "updateAssets" => {
            let raw = std::str::from_utf8(payload)
                .map_err(|e| Error::Broker(format!("payout feed is not UTF-8: {e}")))?;
            BrokerEvent::Assets(raw.to_string())
        }
        "successopenOrder" => {
            let opened: OpenedOrder = serde_json::from_slice(payload)?;
            BrokerEvent::OrderOpened {
                request_id: opened.request_id,
                trade_id: opened.id,
            }
        }
        "failopenOrder" => {
            let value: Value = serde_json::from_slice(payload)?;
            BrokerEvent::OrderFailed {
                request_id: value.get("requestId").and_then(Value::as_u64),
                reason: value
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string()),
            }
        }
        "successcloseOrder" => {
            let closed: ClosedOrders = serde_json::from_slice(payload)?;
            BrokerEvent::DealsClosed(
                closed
                    .deals
                    .into_iter()
                    .map(|d| (d.id, deal_result(d.profit)))
                    .collect(),
            )
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Negative profit is a loss; anything else (including a refund) is a win.
pub fn deal_result(profit: f64) -> TradeResult {
    if profit < 0.0 {
        TradeResult::Loss
    } else {
        TradeResult::Win
    }
}

/// `42["openOrder",{...}]` for one fixed-time option.
pub fn open_order_message(
    pair: &str,
    stake: f64,
    action: TradeAction,
    demo: bool,
    request_id: u64,
    expiry_secs: u64,
) -> String {
    let body = json!({
        "asset": pair,
        "amount": stake,
        "action": action.to_string(),
        "isDemo": u8::from(demo),
        "requestId": request_id,
        "optionType": OPTION_TYPE_FIXED,
        "time": expiry_secs,
    });
    format!("42{}", json!(["openOrder", body]))
}

// ─── Payload types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct OpenedOrder {
    id: String,
    #[serde(rename = "requestId")]
    request_id: u64,
}

#[derive(Deserialize)]
struct ClosedOrders {
    #[serde(default)]
    deals: Vec<ClosedDeal>,
}

#[derive(Deserialize)]
struct ClosedDeal {
    id: String,
    profit: f64,
}
