// =============================================================================
// WebSocket Client (C5)
// =============================================================================
//
// Connects the way the teacher's `market_data::trade_stream::run_trade_stream`
// connects to Binance — `tokio_tungstenite::connect_async` plus a
// `futures_util::StreamExt` read loop — but frames a KIS-shaped subscribe
// envelope, parses pipe-delimited bodies (`ws_frames`), and rebuilds its
// subscription set across reconnects, which the teacher's single-stream
// helper never needed to do.
//
// Subscription registry: single writer is the receive loop (it rebuilds the
// set on reconnect); external `subscribe`/`unsubscribe` calls take the same
// mutex the receive loop uses only for the brief window where they mutate
// it, per spec.md §5.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::broker::ws_frames::{parse_frame, WsFrame};
use crate::config::credentials::Server;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const SUBSCRIBE_SPACING: Duration = Duration::from_millis(500);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Callback = Box<dyn Fn(WsFrame) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Subscription {
    code: String,
    tr_id: String,
}

struct Registry {
    active: Vec<Subscription>,
    callbacks: HashMap<String, Vec<usize>>,
}

/// WebSocket client for the broker's realtime feed. Cheap to share via
/// `Arc`: `subscribe`/`unsubscribe` can be called from any task while
/// `run()` drives the receive loop on its own.
pub struct WsClient {
    server: Server,
    approval_key: Mutex<String>,
    registry: Mutex<Registry>,
    callbacks: Mutex<Vec<Callback>>,
}

impl WsClient {
    pub fn new(server: Server, approval_key: String) -> Arc<Self> {
        Arc::new(Self {
            server,
            approval_key: Mutex::new(approval_key),
            registry: Mutex::new(Registry {
                active: Vec::new(),
                callbacks: HashMap::new(),
            }),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    /// Update the approval key (the access token used as `approval_key` in
    /// every subscribe/unsubscribe frame) after a token refresh.
    pub fn set_approval_key(&self, key: String) {
        *self.approval_key.lock() = key;
    }

    /// Register a callback invoked for every parsed frame whose TR-ID
    /// matches `tr_id`. Returns a handle usable with no corresponding
    /// "unregister" — per spec.md §9, the callback registry is meant to be
    /// replaced by a typed event bus; this preserves the simpler interface
    /// for the transitional implementation.
    pub fn on(&self, tr_id: &str, callback: Callback) {
        let mut callbacks = self.callbacks.lock();
        let idx = callbacks.len();
        callbacks.push(callback);
        drop(callbacks);

        self.registry
            .lock()
            .callbacks
            .entry(tr_id.to_string())
            .or_default()
            .push(idx);
    }

    pub fn subscribe(&self, code: &str, tr_ids: &[&str]) {
        let mut reg = self.registry.lock();
        for tr_id in tr_ids {
            let sub = Subscription {
                code: code.to_string(),
                tr_id: tr_id.to_string(),
            };
            if !reg.active.contains(&sub) {
                reg.active.push(sub);
            }
        }
    }

    pub fn unsubscribe(&self, code: &str) {
        self.registry.lock().active.retain(|s| s.code != code);
    }

    fn active_subscriptions(&self) -> Vec<Subscription> {
        self.registry.lock().active.clone()
    }

    /// Run the client until cancelled: connect, subscribe to everything
    /// currently registered, read frames and dispatch callbacks, and
    /// reconnect with a fixed 5s backoff on any drop.
    pub async fn run(self: Arc<Self>, cancel: tokio::sync::watch::Receiver<bool>) {
        let mut cancel = cancel;
        loop {
            if *cancel.borrow() {
                return;
            }

            match self.connect_and_run(&mut cancel).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(error = %e, "websocket connection lost, reconnecting in 5s");
                    sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }

    async fn connect_and_run(
        &self,
        cancel: &mut tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let (ws_stream, _) = connect_async(self.server.ws_url()).await?;
        info!(url = %self.server.ws_url(), "websocket connected");

        let (mut write, mut read) = ws_stream.split();
        self.resubscribe_all(&mut write).await;

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        self.send_all_unsubscribes(&mut write).await;
                        let _ = write.close().await;
                        return Ok(());
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("websocket closed by server");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        // Frames look like "0|H0STCNT0|001|<pipe-delimited body>" for data
        // frames, or a JSON control message (subscribe ack / heartbeat).
        let mut parts = text.splitn(4, '|');
        let (Some(flag), Some(tr_id), Some(_count), Some(body)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            debug!(text, "non-data websocket message ignored");
            return;
        };

        if flag != "0" && flag != "1" {
            debug!(text, "unrecognized websocket frame flag");
            return;
        }

        let Some(frame) = parse_frame(tr_id, body) else {
            debug!(tr_id, "dropped malformed websocket frame");
            return;
        };

        let registered: Vec<usize> = self
            .registry
            .lock()
            .callbacks
            .get(tr_id)
            .cloned()
            .unwrap_or_default();

        let callbacks = self.callbacks.lock();
        for idx in registered {
            if let Some(cb) = callbacks.get(idx) {
                cb(frame.clone());
            }
        }
    }

    async fn resubscribe_all(
        &self,
        write: &mut futures_util::stream::SplitSink<WsStream, Message>,
    ) {
        let subs = self.active_subscriptions();
        for sub in subs {
            self.send_frame(write, &sub, "1").await;
            sleep(SUBSCRIBE_SPACING).await;
        }
    }

    async fn send_all_unsubscribes(
        &self,
        write: &mut futures_util::stream::SplitSink<WsStream, Message>,
    ) {
        let subs = self.active_subscriptions();
        for sub in subs {
            self.send_frame(write, &sub, "2").await;
        }
    }

    async fn send_frame(
        &self,
        write: &mut futures_util::stream::SplitSink<WsStream, Message>,
        sub: &Subscription,
        tr_type: &str,
    ) {
        let approval_key = self.approval_key.lock().clone();
        let envelope = json!({
            "header": {
                "approval_key": approval_key,
                "custtype": "P",
                "tr_type": tr_type,
                "content-type": "utf-8",
            },
            "body": {
                "input": {
                    "tr_id": sub.tr_id,
                    "tr_key": sub.code,
                }
            }
        });

        if let Err(e) = write.send(Message::Text(envelope.to_string())).await {
            warn!(error = %e, code = %sub.code, tr_id = %sub.tr_id, "failed to send subscribe frame");
        }
    }
}

/// The three subscriptions the core keeps active per symbol (spec.md
/// §4.5): orderbook, trades, fills.
pub const REQUIRED_TR_IDS: [&str; 3] = [
    crate::broker::ws_frames::ORDERBOOK_TR_ID,
    crate::broker::ws_frames::TRADE_TR_ID,
    crate::broker::ws_frames::FILL_TR_ID,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_dedupes_same_code_and_tr_id() {
        let client = WsClient::new(Server::Paper, "key".into());
        client.subscribe("005930", &REQUIRED_TR_IDS);
        client.subscribe("005930", &REQUIRED_TR_IDS);
        assert_eq!(client.registry.lock().active.len(), 3);
    }

    #[test]
    fn unsubscribe_removes_all_tr_ids_for_code() {
        let client = WsClient::new(Server::Paper, "key".into());
        client.subscribe("005930", &REQUIRED_TR_IDS);
        client.subscribe("000660", &REQUIRED_TR_IDS);
        client.unsubscribe("005930");
        let active = client.registry.lock().active.clone();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(|s| s.code == "000660"));
    }
}
