//! End-to-end throughput benchmark for Rally.
//!
//! Fills a running server with parties over real WebSocket connections and
//! counts how many relayed `state` messages the clients receive.
//!
//! Usage: `e2e_throughput [parties] [party_size] [url]`

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let parties: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let party_size: usize = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(4)
        .clamp(2, 8);
    let url = args.get(3).cloned().unwrap_or_else(|| DEFAULT_URL.to_string());

    println!("Rally end-to-end throughput");
    println!("  Server:     {} (start it with: cargo run --release)", url);
    println!("  Parties:    {}", parties);
    println!("  Party size: {}", party_size);
    println!("  Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let received = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(parties * party_size + 1));
    let mut handles = Vec::new();

    for party in 0..parties {
        let received = Arc::clone(&received);
        let barrier = Arc::clone(&barrier);
        let url = url.clone();

        handles.push(tokio::spawn(async move {
            if let Err(e) = run_party(&url, party_size, received, barrier).await {
                eprintln!("Party {} error: {}", party, e);
            }
        }));
    }

    barrier.wait().await;
    println!("All {} clients seated", parties * party_size);

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    received.store(0, Ordering::SeqCst);
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed().as_secs_f64();
    let total = received.load(Ordering::SeqCst);
    let clients = (parties * party_size) as f64;

    println!();
    println!("Results");
    println!("  Duration:        {:>10.2}s", elapsed);
    println!("  Relayed states:  {:>10}", total);
    println!("  Throughput:      {:>10.0} msg/s", total as f64 / elapsed);
    println!("  Per client:      {:>10.0} msg/s", total as f64 / elapsed / clients);

    for handle in handles {
        handle.abort();
    }
}

/// Seat one party: the host creates it, the guests join by code.
async fn run_party(
    url: &str,
    party_size: usize,
    received: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let (mut host, _) = connect_async(url).await?;
    send(&mut host, json!({"type": "create", "name": "host"})).await?;
    let welcome = expect(&mut host, "welcome").await?;
    let code = welcome["code"].as_str().ok_or("welcome without code")?.to_string();

    let mut clients = vec![host];
    for i in 1..party_size {
        let (mut guest, _) = connect_async(url).await?;
        send(&mut guest, json!({"type": "join", "code": code, "name": format!("guest{}", i)}))
            .await?;
        expect(&mut guest, "welcome").await?;
        clients.push(guest);
    }

    let tasks: Vec<_> = clients
        .into_iter()
        .map(|client| {
            let received = Arc::clone(&received);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(run_client(client, received, barrier))
        })
        .collect();

    for task in tasks {
        task.await??;
    }
    Ok(())
}

/// Blast state updates while counting the ones relayed from the party.
async fn run_client(
    client: Client,
    received: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let (mut sender, mut receiver) = client.split();
    barrier.wait().await;

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if text.contains(r#""type":"state""#) {
                    received.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    });

    let mut tick = 0u64;
    loop {
        tick += 1;
        let state = json!({"type": "state", "x": tick as f64 * 0.1, "yaw": 90, "anim": "run"});
        if sender.send(Message::Text(state.to_string())).await.is_err() {
            break;
        }
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}

async fn send(client: &mut Client, value: Value) -> Result<(), BoxError> {
    client.send(Message::Text(value.to_string())).await?;
    Ok(())
}

/// Read until a message of the given type arrives.
async fn expect(client: &mut Client, kind: &str) -> Result<Value, BoxError> {
    while let Some(msg) = client.next().await {
        if let Message::Text(text) = msg? {
            let value: Value = serde_json::from_str(&text)?;
            if value["type"] == kind {
                return Ok(value);
            }
            if value["type"] == "error" {
                return Err(format!("server error: {}", value["msg"]).into());
            }
        }
    }
    Err("connection closed".into())
}
