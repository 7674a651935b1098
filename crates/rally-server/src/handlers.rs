//! Connection handlers for the Rally server.
//!
//! This module owns the socket side of each connection: it feeds inbound
//! frames into the [`Hub`], drains the connection's outbound queue into the
//! socket, and runs the disconnect hook exactly once when either side ends.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use rally_core::Hub;
use rally_transport::{spawn_sweeper, ConnectionId, Outgoing, PeerTable};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Party registry behind its serialization point.
    pub hub: Hub,
    /// Outbound queues of live connections.
    pub peers: Arc<PeerTable>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            hub: Hub::with_config(config.registry(), config.router()),
            peers: Arc::new(PeerTable::new()),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let sweeper = spawn_sweeper(Arc::clone(&state.peers), config.heartbeat_interval());

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Rally server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let result = serve(listener, state).await;
    sweeper.abort();
    result
}

/// Serve the application on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O error.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();

    Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Health check handler, reporting live party and member counts.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "parties": stats.party_count,
        "members": stats.member_count,
        "connections": state.peers.len(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = ConnectionId::generate();

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let mut outgoing = state.peers.register(connection_id.clone());

    // Writer: drain this connection's queue into the socket.
    let writer_id = connection_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(item) = outgoing.recv().await {
            let result = match item {
                Outgoing::Payload(data) => {
                    metrics::record_message(data.len(), "outbound");
                    let text = String::from_utf8_lossy(&data).into_owned();
                    sender.send(Message::Text(text)).await
                }
                Outgoing::Ping => sender.send(Message::Ping(Vec::new())).await,
                Outgoing::Close => {
                    debug!(connection = %writer_id, "Closing connection");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!(connection = %writer_id, error = %e, "Send failed");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(connection = %connection_id, "Writer finished");
                break;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&state, &connection_id, text.as_bytes());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        handle_inbound(&state, &connection_id, &data);
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        state.peers.mark_alive(&connection_id);
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: leave the party, then drop the outbound queue.
    state.hub.disconnect(&connection_id, state.peers.as_ref());
    state.peers.remove(&connection_id);
    writer.abort();
    metrics::set_registry(state.hub.stats());

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Feed one inbound frame into the hub.
fn handle_inbound(state: &AppState, connection_id: &ConnectionId, data: &[u8]) {
    let start = Instant::now();
    state.peers.mark_alive(connection_id);
    metrics::record_message(data.len(), "inbound");

    state.hub.handle(connection_id, data, state.peers.as_ref());

    metrics::record_latency(start.elapsed().as_secs_f64());
    metrics::set_registry(state.hub.stats());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start() -> (Arc<AppState>, String) {
        let mut config = Config::default();
        config.metrics.enabled = false;

        let state = Arc::new(AppState::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::clone(&state)));

        (state, format!("ws://{}/ws", addr))
    }

    /// Like [`start`], with a heartbeat sweeper running at `interval`.
    async fn start_with_heartbeat(interval: Duration) -> (Arc<AppState>, String) {
        let (state, url) = start().await;
        // Detached; runs until the test runtime shuts down.
        let _sweeper = spawn_sweeper(Arc::clone(&state.peers), interval);
        (state, url)
    }

    async fn connect(url: &str) -> Client {
        connect_async(url).await.unwrap().0
    }

    async fn send(client: &mut Client, value: Value) {
        client
            .send(tungstenite::Message::Text(value.to_string()))
            .await
            .unwrap();
    }

    async fn next_json(client: &mut Client) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for message")
                .unwrap()
                .unwrap();
            if let tungstenite::Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn wait_for(state: &AppState, f: impl Fn(&AppState) -> bool) {
        for _ in 0..100 {
            if f(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_party_session_over_websocket() {
        let (state, url) = start().await;

        let mut a = connect(&url).await;
        send(&mut a, json!({"type": "create", "name": "Ada"})).await;
        let welcome = next_json(&mut a).await;
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["players"], json!([]));
        let a_id = welcome["id"].as_str().unwrap().to_string();
        let code = welcome["code"].as_str().unwrap().to_string();

        let mut b = connect(&url).await;
        send(&mut b, json!({"type": "join", "code": code.to_lowercase()})).await;
        let welcome = next_json(&mut b).await;
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["code"], code.as_str());
        assert_eq!(welcome["players"][0]["id"], a_id.as_str());
        let b_id = welcome["id"].as_str().unwrap().to_string();

        let joined = next_json(&mut a).await;
        assert_eq!(joined["type"], "joined");
        assert_eq!(joined["id"], b_id.as_str());

        send(&mut a, json!({"type": "state", "x": 5})).await;
        let moved = next_json(&mut b).await;
        assert_eq!(moved["type"], "state");
        assert_eq!(moved["id"], a_id.as_str());
        assert_eq!(moved["x"], 5.0);
        assert_eq!(moved["anim"], "idle");

        b.close(None).await.unwrap();
        let left = next_json(&mut a).await;
        assert_eq!(left, json!({"type": "left", "id": b_id}));
        wait_for(&state, |s| s.hub.stats().member_count == 1).await;

        a.close(None).await.unwrap();
        wait_for(&state, |s| s.hub.stats().party_count == 0).await;
        wait_for(&state, |s| s.peers.is_empty()).await;
    }

    #[tokio::test]
    async fn test_silent_connection_is_dropped_by_heartbeat() {
        let (state, url) = start_with_heartbeat(Duration::from_millis(150)).await;

        let mut a = connect(&url).await;
        send(&mut a, json!({"type": "create"})).await;
        let code = next_json(&mut a).await["code"].as_str().unwrap().to_string();

        // B joins, then never reads again, so it never answers a ping.
        let mut b = connect(&url).await;
        send(&mut b, json!({"type": "join", "code": code})).await;
        let b_id = next_json(&mut b).await["id"].as_str().unwrap().to_string();

        let joined = next_json(&mut a).await;
        assert_eq!(joined["type"], "joined");

        // A keeps reading, which answers pings, until B is timed out.
        let left = next_json(&mut a).await;
        assert_eq!(left, json!({"type": "left", "id": b_id}));

        wait_for(&state, |s| s.hub.stats().member_count == 1).await;
        assert_eq!(state.hub.stats().party_count, 1);
        wait_for(&state, |s| s.peers.len() == 1).await;
        drop(b);
    }

    #[tokio::test]
    async fn test_malformed_input_gets_no_reply() {
        let (_state, url) = start().await;
        let mut a = connect(&url).await;

        a.send(tungstenite::Message::Text("{oops".into())).await.unwrap();
        send(&mut a, json!({"type": "chat", "text": "nobody home"})).await;
        send(&mut a, json!({"type": "join", "code": "QQQQ"})).await;

        // The first reply is the error for the join; nothing came before it.
        let reply = next_json(&mut a).await;
        assert_eq!(reply, json!({"type": "error", "msg": "Party not found"}));
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (_state, url) = start().await;
        let mut a = connect(&url).await;
        send(&mut a, json!({"type": "create"})).await;
        next_json(&mut a).await;

        let addr = url.trim_start_matches("ws://").trim_end_matches("/ws");
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        let body = &response[response.find("\r\n\r\n").unwrap() + 4..];
        let health: Value = serde_json::from_str(body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["parties"], 1);
        assert_eq!(health["members"], 1);
        assert_eq!(health["connections"], 1);
    }
}
