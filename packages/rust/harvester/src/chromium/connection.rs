//! DevTools protocol connection: one WebSocket, many in-flight commands.
//!
//! A reader task routes command replies back to their callers by `id` and
//! forwards session-scoped events to whoever subscribed to that `sessionId`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use sitechat_shared::{Result, SiteChatError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type Reply = std::result::Result<Value, String>;

/// A protocol event delivered to a session subscriber.
#[derive(Debug, Clone)]
pub(crate) struct CdpEvent {
    pub method: String,
    pub params: Value,
}

#[derive(Default)]
struct Routes {
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    subscribers: Mutex<HashMap<String, mpsc::UnboundedSender<CdpEvent>>>,
}

pub(crate) struct CdpConnection {
    sink: Mutex<SplitSink<WsStream, WsMessage>>,
    routes: Arc<Routes>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to the browser-level DevTools endpoint.
    pub(crate) async fn connect(ws_url: &str) -> Result<Self> {
        let (stream, _) = connect_async(ws_url).await.map_err(|e| {
            SiteChatError::HarvesterUnavailable(format!("devtools connect to {ws_url}: {e}"))
        })?;
        let (sink, read) = stream.split();

        let routes = Arc::new(Routes::default());
        let reader = tokio::spawn(read_loop(read, Arc::clone(&routes)));

        debug!(ws_url, "devtools connection established");

        Ok(Self {
            sink: Mutex::new(sink),
            routes,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    /// Send a command and wait for its reply.
    pub(crate) async fn call(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.routes.pending.lock().await.insert(id, tx);

        let mut message = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            message["sessionId"] = Value::String(session_id.to_string());
        }

        trace!(id, method, "devtools call");
        let sent = self
            .sink
            .lock()
            .await
            .send(WsMessage::Text(message.to_string().into()))
            .await;

        if let Err(e) = sent {
            self.routes.pending.lock().await.remove(&id);
            return Err(SiteChatError::Network(format!("devtools {method}: send failed: {e}")));
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(SiteChatError::Network(format!("devtools {method}: {message}"))),
            Err(_) => Err(SiteChatError::Network(format!(
                "devtools {method}: connection closed"
            ))),
        }
    }

    /// Receive every event emitted for `session_id` from now on.
    pub(crate) async fn subscribe(&self, session_id: &str) -> mpsc::UnboundedReceiver<CdpEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .subscribers
            .lock()
            .await
            .insert(session_id.to_string(), tx);
        rx
    }

    pub(crate) async fn unsubscribe(&self, session_id: &str) {
        self.routes.subscribers.lock().await.remove(session_id);
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut read: SplitStream<WsStream>, routes: Arc<Routes>) {
    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(WsMessage::Text(t)) => t,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "devtools connection error");
                break;
            }
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(payload) => dispatch(&routes, payload).await,
            Err(e) => warn!(error = %e, "unparsable devtools message"),
        }
    }

    // Fail everyone still waiting; dropping the senders ends subscriber streams.
    for (_, tx) in routes.pending.lock().await.drain() {
        let _ = tx.send(Err("connection closed".into()));
    }
    routes.subscribers.lock().await.clear();
    debug!("devtools reader finished");
}

/// Route one incoming message to a pending caller or a session subscriber.
async fn dispatch(routes: &Routes, payload: Value) {
    if let Some(id) = payload.get("id").and_then(Value::as_u64) {
        let Some(tx) = routes.pending.lock().await.remove(&id) else {
            return;
        };
        let reply = match payload.get("error") {
            Some(error) => Err(error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown protocol error")
                .to_string()),
            None => Ok(payload.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = tx.send(reply);
        return;
    }

    let (Some(method), Some(session_id)) = (
        payload.get("method").and_then(Value::as_str),
        payload.get("sessionId").and_then(Value::as_str),
    ) else {
        return;
    };

    if let Some(tx) = routes.subscribers.lock().await.get(session_id) {
        let _ = tx.send(CdpEvent {
            method: method.to_string(),
            params: payload.get("params").cloned().unwrap_or(Value::Null),
        });
    }
}
