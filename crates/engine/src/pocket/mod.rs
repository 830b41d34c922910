pub mod protocol;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use common::{
    BrokerClient, Error, OutcomeStatus, Placement, Result, TradeAction, TradeResult,
};

use protocol::{BrokerEvent, Frame};

const DEMO_URL: &str = "wss://demo-api-eu.po.market/socket.io/?EIO=4&transport=websocket";
const LIVE_URL: &str = "wss://api-eu.po.market/socket.io/?EIO=4&transport=websocket";
const ORIGIN: &str = "https://pocketoption.com";

/// How long a placement waits for `successopenOrder` / `failopenOrder`.
pub const PLACEMENT_TIMEOUT: Duration = Duration::from_secs(10);

enum OrderReply {
    Opened(String),
    Failed(String),
}

/// State shared between the session tasks and the client.
#[derive(Default)]
struct SessionState {
    payout_feed: Option<String>,
    pending_orders: HashMap<u64, oneshot::Sender<OrderReply>>,
    closed_deals: HashMap<String, TradeResult>,
}

struct Session {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Session {
    fn is_alive(&self) -> bool {
        !self.reader.is_finished() && !self.writer.is_finished()
    }

    fn abort(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// PocketOption session over Socket.IO (Engine.IO v4) on a WebSocket.
///
/// `connect` opens the socket and spawns a reader and a writer task. The reader
/// answers the handshake and pings, keeps the payout table current, and
/// routes order replies and closed deals into the shared state.
pub struct PocketOptionClient {
    ssid: String,
    demo: bool,
    url: String,
    state: Arc<Mutex<SessionState>>,
    session: Mutex<Option<Session>>,
    next_request_id: AtomicU64,
}

impl PocketOptionClient {
    pub fn new(ssid: impl Into<String>, demo: bool) -> Self {
        let url = if demo { DEMO_URL } else { LIVE_URL };
        Self::with_url(ssid, demo, url)
    }

    pub fn with_url(ssid: impl Into<String>, demo: bool, url: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            demo,
            url: url.into(),
            state: Arc::new(Mutex::new(SessionState::default())),
            session: Mutex::new(None),
            next_request_id: AtomicU64::new(chrono::Utc::now().timestamp_millis() as u64),
        }
    }

    async fn is_alive(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(Session::is_alive)
    }

    async fn outbound(&self) -> Result<mpsc::UnboundedSender<Message>> {
        match self.session.lock().await.as_ref() {
            Some(session) if session.is_alive() => Ok(session.outbound.clone()),
            _ => Err(Error::Broker("not connected".into())),
        }
    }
}

#[async_trait]
impl BrokerClient for PocketOptionClient {
    async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(Session::is_alive) {
            return Ok(());
        }
        if let Some(stale) = session.take() {
            stale.abort();
        }

        let url = Url::parse(&self.url).map_err(|e| Error::WebSocket(e.to_string()))?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_static(ORIGIN));

        info!(demo = self.demo, "Connecting to PocketOption");
        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        let (mut write, read) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    warn!(error = %e, "PocketOption write failed");
                    break;
                }
            }
        });

        let reader = tokio::spawn(read_loop(
            read,
            outbound.clone(),
            self.state.clone(),
            self.ssid.clone(),
        ));

        *session = Some(Session {
            outbound,
            reader,
            writer,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(session) = self.session.lock().await.take() {
            session.abort();
            info!("PocketOption session closed");
        }
        // Dropping the senders wakes any placement still waiting for a reply
        self.state.lock().await.pending_orders.clear();
        Ok(())
    }

    async fn place_order(
        &self,
        stake: f64,
        pair: &str,
        action: TradeAction,
        expiry_secs: u64,
    ) -> Result<Placement> {
        let outbound = self.outbound().await?;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        let (reply_tx, reply_rx) = oneshot::channel();
        self.state
            .lock()
            .await
            .pending_orders
            .insert(request_id, reply_tx);

        let msg = protocol::open_order_message(pair, stake, action, self.demo, request_id, expiry_secs);
        outbound
            .send(Message::Text(msg))
            .map_err(|_| Error::Broker("session writer closed".into()))?;

        let reply = tokio::time::timeout(PLACEMENT_TIMEOUT, reply_rx).await;
        match reply {
            Ok(Ok(OrderReply::Opened(trade_id))) => Ok(Placement::accepted(trade_id)),
            Ok(Ok(OrderReply::Failed(reason))) => {
                warn!(pair, request_id, %reason, "Order rejected by PocketOption");
                Ok(Placement::rejected())
            }
            Ok(Err(_)) => Err(Error::Broker("session closed before order reply".into())),
            Err(_) => {
                self.state.lock().await.pending_orders.remove(&request_id);
                Err(Error::Broker(format!(
                    "no order reply within {}s",
                    PLACEMENT_TIMEOUT.as_secs()
                )))
            }
        }
    }

    async fn poll_outcome(&self, trade_id: &str) -> Result<OutcomeStatus> {
        let mut state = self.state.lock().await;
        Ok(match state.closed_deals.remove(trade_id) {
            Some(result) => OutcomeStatus::Closed(result),
            None => OutcomeStatus::Pending,
        })
    }

    /// The last published payout table, only while the session is alive.
    async fn payout_feed(&self) -> Option<String> {
        if !self.is_alive().await {
            warn!("PocketOption session is down, payout table unavailable");
            return None;
        }
        self.state.lock().await.payout_feed.clone()
    }
}

async fn read_loop<S>(
    mut read: S,
    outbound: mpsc::UnboundedSender<Message>,
    state: Arc<Mutex<SessionState>>,
    ssid: String,
) where
    S: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let mut binary_event: Option<String> = None;

    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "PocketOption stream error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match protocol::parse_frame(&text) {
                Frame::Open => {
                    let _ = outbound.send(Message::Text("40".into()));
                }
                Frame::Connected => {
                    debug!("Namespace joined, authenticating");
                    let _ = outbound.send(Message::Text(ssid.clone()));
                }
                Frame::Ping => {
                    let _ = outbound.send(Message::Text("3".into()));
                }
                Frame::BinaryHeader(event) => binary_event = Some(event),
                Frame::Event(name, payload) => {
                    dispatch(&state, &name, payload.to_string().as_bytes()).await;
                }
                Frame::Other => {}
            },
            Message::Binary(data) => {
                if let Some(name) = binary_event.take() {
                    dispatch(&state, &name, protocol::binary_payload(&data)).await;
                }
            }
            Message::Close(frame) => {
                info!(?frame, "PocketOption closed the session");
                break;
            }
            _ => {}
        }
    }
}

async fn dispatch(state: &Mutex<SessionState>, name: &str, payload: &[u8]) {
    let event = match protocol::decode_event(name, payload) {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(e) => {
            warn!(event = name, error = %e, "Failed to decode PocketOption event");
            return;
        }
    };

    let mut state = state.lock().await;
    match event {
        BrokerEvent::Assets(raw) => state.payout_feed = Some(raw),
        BrokerEvent::OrderOpened { request_id, trade_id } => {
            if let Some(reply) = state.pending_orders.remove(&request_id) {
                let _ = reply.send(OrderReply::Opened(trade_id));
            }
        }
        BrokerEvent::OrderFailed { request_id, reason } => {
            // Without a request id, fail the oldest outstanding order
            let id = request_id.or_else(|| state.pending_orders.keys().min().copied());
            let reply = id.and_then(|id| state.pending_orders.remove(&id));
            if let Some(reply) = reply {
                let _ = reply.send(OrderReply::Failed(reason));
            }
        }
        BrokerEvent::DealsClosed(deals) => {
            for (trade_id, result) in deals {
                debug!(%trade_id, %result, "Deal closed");
                state.closed_deals.insert(trade_id, result);
            }
        }
    }
}
