//! Low-level CDP WebSocket transport.
//!
//! One connection per attached target. Requests carry `{id, method, params}`
//! and are correlated with replies by id; unsolicited events carry `{method,
//! params}` without an id and are fanned out to subscribers. A single reader
//! task per connection does the demultiplexing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Result, WebtapError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, String>>>>>;
type SubscriberMap = Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A persistent CDP session over one WebSocket.
pub struct CdpTransport {
    write: Arc<Mutex<SplitSink<WsStream, WsMessage>>>,
    pending: PendingMap,
    subscribers: SubscriberMap,
    next_id: AtomicU64,
    reader: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for CdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpTransport")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl CdpTransport {
    /// Connect to a CDP WebSocket endpoint (`ws://host:port/devtools/...`).
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (stream, _) = tokio::time::timeout(
            CONNECT_TIMEOUT,
            tokio_tungstenite::connect_async(ws_url),
        )
        .await
        .map_err(|_| WebtapError::Connection(format!("connect timed out: {ws_url}")))?
        .map_err(|e| WebtapError::Connection(format!("connect failed: {e}")))?;

        let (write, read) = stream.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));

        let reader = tokio::spawn(Self::reader_loop(
            read,
            Arc::clone(&pending),
            Arc::clone(&subscribers),
        ));

        Ok(Self {
            write: Arc::new(Mutex::new(write)),
            pending,
            subscribers,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    /// Reader task: route each incoming frame to a pending call or an event
    /// subscriber. On exit every pending sender is dropped, which fails the
    /// in-flight calls with a connection error.
    async fn reader_loop(mut read: SplitStream<WsStream>, pending: PendingMap, subs: SubscriberMap) {
        while let Some(msg) = read.next().await {
            let text = match msg {
                Ok(WsMessage::Text(t)) => t.to_string(),
                Ok(WsMessage::Close(_)) => break,
                Err(e) => {
                    log::debug!("CDP read error: {e}");
                    break;
                }
                _ => continue,
            };

            let json: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) => continue,
            };

            if let Some(id) = json.get("id").and_then(Value::as_u64) {
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let reply = match json.get("error") {
                        Some(err) => Err(err
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("CDP error")
                            .to_string()),
                        None => Ok(json.get("result").cloned().unwrap_or(Value::Null)),
                    };
                    let _ = tx.send(reply);
                }
            } else if let Some(method) = json.get("method").and_then(Value::as_str) {
                let params = json.get("params").cloned().unwrap_or(Value::Null);
                let mut subs = subs.lock().await;
                if let Some(senders) = subs.get_mut(method) {
                    senders.retain(|tx| tx.send(params.clone()).is_ok());
                }
            }
        }
        pending.lock().await.clear();
    }

    /// Send a CDP command and wait for its reply, bounded by the default
    /// call timeout.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_with_timeout(method, params, DEFAULT_CALL_TIMEOUT).await
    }

    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let msg = serde_json::json!({ "id": id, "method": method, "params": params });
        let started = Instant::now();
        let written = self
            .write
            .lock()
            .await
            .send(WsMessage::Text(msg.to_string().into()))
            .await;
        if let Err(e) = written {
            self.pending.lock().await.remove(&id);
            return Err(WebtapError::Connection(format!("send failed: {e}")));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(WebtapError::Cdp {
                method: method.to_string(),
                message,
            }),
            Ok(Err(_)) => Err(WebtapError::Connection(
                "connection closed while waiting for reply".to_string(),
            )),
            Err(_) => {
                // A timed-out id must not leak into the pending map, or a
                // late reply would wake the wrong future.
                self.pending.lock().await.remove(&id);
                Err(WebtapError::Timeout {
                    method: method.to_string(),
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    /// Subscribe to an unsolicited event by method name. Every matching
    /// event's params are delivered to the returned channel until the
    /// receiver is dropped.
    pub async fn subscribe(&self, event: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .await
            .entry(event.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Send a command, then wait (bounded) for a named event to fire.
    ///
    /// Timing out on the event is not an error here: the command result is
    /// returned anyway and `fired` tells the caller whether the event came.
    /// Navigation uses this — a slow page load should not poison the call.
    pub async fn send_and_wait_event(
        &self,
        method: &str,
        params: Value,
        event: &str,
        timeout: Duration,
    ) -> Result<(Value, bool)> {
        let mut events = self.subscribe(event).await;
        let result = self.send(method, params).await?;
        let fired = tokio::time::timeout(timeout, events.recv()).await.is_ok();
        Ok((result, fired))
    }

    /// Whether the reader loop is still alive (the socket has not closed).
    pub fn is_connected(&self) -> bool {
        !self.reader.is_finished()
    }
}

impl Drop for CdpTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
