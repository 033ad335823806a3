//! Stream Lifecycle Integration Tests
//!
//! Drives the hub client against an in-process WebSocket hub: subscription
//! ordering, reconnect behavior, operator stop, and tick recording with
//! partial fields.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use market_stream::{
    ConnectionState, CsvTickSink, HubClientConfig, HubEvent, InstrumentSubscription,
    MarketHubClient, RetryConfig, SubscriptionSet, TickWriter, WriterStats,
};

const RECORD_SEPARATOR: char = '\u{1e}';

/// Fast settings for tests.
const RETRY_DELAY: Duration = Duration::from_millis(100);
const PACING: Duration = Duration::from_millis(10);

// =============================================================================
// Mock Hub
// =============================================================================

/// Command sent to the currently connected client.
enum HubCommand {
    /// Send a raw text payload.
    SendText(String),
    /// Close the connection from the server side.
    Drop,
}

/// In-process hub: accepts one connection at a time, answers the protocol
/// handshake, records subscribe invocations, and follows scripted commands.
struct MockHub {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    /// (connection index, symbol) per subscribe invocation, in receipt order.
    subscribes: Arc<parking_lot::Mutex<Vec<(usize, String)>>>,
    cmd_tx: mpsc::UnboundedSender<HubCommand>,
}

impl MockHub {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let subscribes = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cmd_rx = Arc::new(tokio::sync::Mutex::new(cmd_rx));

        let conn_counter = Arc::clone(&connections);
        let subs = Arc::clone(&subscribes);
        tokio::spawn(async move {
            let mut index = 0usize;
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                index += 1;
                conn_counter.fetch_add(1, Ordering::SeqCst);
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                serve_connection(ws, index, Arc::clone(&subs), Arc::clone(&cmd_rx)).await;
            }
        });

        Self {
            addr,
            connections,
            subscribes,
            cmd_tx,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}/hubs/market", self.addr)
    }

    fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn subscribed_symbols(&self, connection: usize) -> Vec<String> {
        self.subscribes
            .lock()
            .iter()
            .filter(|(idx, _)| *idx == connection)
            .map(|(_, symbol)| symbol.clone())
            .collect()
    }

    fn total_subscribes(&self) -> usize {
        self.subscribes.lock().len()
    }

    fn send_market_data(&self, payload: &str) {
        let frame = format!(
            r#"{{"type":1,"target":"MarketData","arguments":[{payload}]}}{RECORD_SEPARATOR}"#
        );
        self.cmd_tx.send(HubCommand::SendText(frame)).unwrap();
    }

    fn drop_connection(&self) {
        self.cmd_tx.send(HubCommand::Drop).unwrap();
    }
}

async fn serve_connection(
    mut ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    index: usize,
    subscribes: Arc<parking_lot::Mutex<Vec<(usize, String)>>>,
    cmd_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<HubCommand>>>,
) {
    // Protocol handshake: first text record, answered with an empty object.
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) if text.contains("protocol") => {
                let response = format!("{{}}{RECORD_SEPARATOR}");
                if ws.send(Message::Text(response.into())).await.is_err() {
                    return;
                }
                break;
            }
            Some(Ok(_)) => {}
            _ => return,
        }
    }

    let mut commands = cmd_rx.lock().await;
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(HubCommand::SendText(text)) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Some(HubCommand::Drop) => {
                    let _ = ws.close(None).await;
                    return;
                }
                None => return,
            },
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    for record in text.split(RECORD_SEPARATOR) {
                        let record = record.trim();
                        if record.is_empty() {
                            continue;
                        }
                        let Ok(value) = serde_json::from_str::<serde_json::Value>(record) else {
                            continue;
                        };
                        if value.get("target").and_then(serde_json::Value::as_str)
                            == Some("SubscribeSymbols")
                        {
                            let symbol = value["arguments"][0]["symbols"][0]
                                .as_str()
                                .unwrap_or_default()
                                .to_owned();
                            subscribes.lock().push((index, symbol));
                        }
                        // Client close frame ends the session.
                        if value.get("type").and_then(serde_json::Value::as_u64) == Some(7) {
                            let _ = ws.close(None).await;
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(_)) => return,
            }
        }
    }
}

// =============================================================================
// Client Harness
// =============================================================================

struct Harness {
    client: Arc<MarketHubClient>,
    events: mpsc::Receiver<HubEvent>,
    stats: Arc<WriterStats>,
    sink_path: PathBuf,
    _dir: tempfile::TempDir,
}

fn default_contracts() -> Vec<InstrumentSubscription> {
    vec![
        InstrumentSubscription::new("F.US.ES", "E-mini S&P"),
        InstrumentSubscription::new("F.US.NQ", "E-mini Nasdaq-100"),
    ]
}

fn spawn_client(url: &str, contracts: Vec<InstrumentSubscription>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let sink_path = dir.path().join("ticks.csv");
    let sink = CsvTickSink::open(&sink_path).unwrap();

    let shutdown = CancellationToken::new();
    let (tick_tx, tick_rx) = mpsc::channel(64);
    let (writer, stats) = TickWriter::new(sink, tick_rx, shutdown.clone());
    tokio::spawn(writer.run());

    let config = HubClientConfig::new(url, "test-token")
        .unwrap()
        .with_subscribe_pacing(PACING)
        .with_keep_alive(Duration::from_secs(30))
        .with_retry(RetryConfig::fixed(RETRY_DELAY));

    let (event_tx, events) = mpsc::channel(256);
    let client = Arc::new(MarketHubClient::new(
        config,
        SubscriptionSet::new(contracts),
        tick_tx,
        event_tx,
        shutdown,
    ));
    Arc::clone(&client).start();

    Harness {
        client,
        events,
        stats,
        sink_path,
        _dir: dir,
    }
}

/// Poll until `predicate` holds or the timeout elapses.
async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}

fn drain_reconnecting_count(events: &mut mpsc::Receiver<HubEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, HubEvent::Reconnecting { .. }) {
            count += 1;
        }
    }
    count
}

fn read_rows(path: &PathBuf) -> Vec<Vec<String>> {
    let contents = std::fs::read_to_string(path).unwrap();
    contents
        .lines()
        .map(|line| line.split(',').map(str::to_owned).collect())
        .collect()
}

// =============================================================================
// Subscription Ordering
// =============================================================================

#[tokio::test]
async fn subscribes_sent_once_per_descriptor_in_order() {
    let hub = MockHub::spawn().await;
    let harness = spawn_client(&hub.url(), default_contracts());

    assert!(
        wait_until(Duration::from_secs(2), || hub.total_subscribes() == 2).await,
        "expected two subscribe sends"
    );
    assert_eq!(hub.subscribed_symbols(1), ["F.US.ES", "F.US.NQ"]);

    // No extra subscribes follow while the connection stays healthy.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hub.total_subscribes(), 2);
    assert_eq!(harness.client.state(), ConnectionState::Open);
}

// =============================================================================
// Tick Recording
// =============================================================================

#[tokio::test]
async fn ticks_recorded_with_blank_missing_fields() {
    let hub = MockHub::spawn().await;
    let harness = spawn_client(&hub.url(), default_contracts());

    assert!(wait_until(Duration::from_secs(2), || hub.total_subscribes() == 2).await);

    hub.send_market_data(
        r#"{"Symbol":"F.US.ES","LastPrice":4390.25,"Bid":4390.0,"Ask":4390.5,"Volume":10}"#,
    );
    hub.send_market_data(r#"{"Symbol":"F.US.NQ","LastPrice":15800.0}"#);

    assert!(
        wait_until(Duration::from_secs(2), || harness.stats.written() == 2).await,
        "expected two recorded ticks"
    );
    harness.client.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let rows = read_rows(&harness.sink_path);
    assert_eq!(rows.len(), 3, "header plus two tick rows");
    assert_eq!(rows[0], ["Timestamp", "Symbol", "LastPrice", "Bid", "Ask", "Volume"]);

    // First row: all fields populated, in receipt order.
    assert_eq!(rows[1][1], "F.US.ES");
    assert_eq!(
        Decimal::from_str(&rows[1][2]).unwrap(),
        Decimal::from_str("4390.25").unwrap()
    );
    assert_eq!(
        Decimal::from_str(&rows[1][3]).unwrap(),
        Decimal::from(4390)
    );
    assert_eq!(rows[1][5], "10");

    // Second row: three trailing empty fields, never zero-defaulted.
    assert_eq!(rows[2][1], "F.US.NQ");
    assert_eq!(
        Decimal::from_str(&rows[2][2]).unwrap(),
        Decimal::from(15800)
    );
    assert_eq!(rows[2][3], "");
    assert_eq!(rows[2][4], "");
    assert_eq!(rows[2][5], "");
}

// =============================================================================
// Reconnect Behavior
// =============================================================================

#[tokio::test]
async fn server_drop_triggers_one_reconnect_cycle_and_resubscription() {
    let hub = MockHub::spawn().await;
    let mut harness = spawn_client(&hub.url(), default_contracts());

    assert!(wait_until(Duration::from_secs(2), || hub.total_subscribes() == 2).await);
    assert_eq!(hub.connection_count(), 1);

    hub.drop_connection();

    // The client re-enters Connecting within the configured delay and
    // reissues both subscriptions on the next open.
    assert!(
        wait_until(RETRY_DELAY * 10, || hub.connection_count() == 2).await,
        "expected a second connection"
    );
    assert!(
        wait_until(Duration::from_secs(2), || {
            hub.subscribed_symbols(2) == ["F.US.ES", "F.US.NQ"]
        })
        .await,
        "expected full re-subscription after reconnect"
    );

    // Exactly one reconnect cycle for one disconnect.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(drain_reconnecting_count(&mut harness.events), 1);
    assert_eq!(hub.connection_count(), 2);
}

#[tokio::test]
async fn repeated_drops_keep_reconnecting_until_stopped() {
    let hub = MockHub::spawn().await;
    let harness = spawn_client(&hub.url(), default_contracts());

    for expected in 2..=4 {
        assert!(
            wait_until(Duration::from_secs(2), || {
                hub.subscribed_symbols(expected - 1).len() == 2
            })
            .await,
            "expected subscriptions on connection {}",
            expected - 1
        );
        hub.drop_connection();
        assert!(
            wait_until(RETRY_DELAY * 10, || hub.connection_count() == expected).await,
            "expected connection {expected}"
        );
    }

    harness.client.stop();
}

#[tokio::test]
async fn refused_connections_are_retried_like_disconnects() {
    // A TCP listener that drops every socket before the WebSocket upgrade:
    // connect attempts fail while Connecting, not while Open.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    let harness = spawn_client(&format!("ws://{addr}/hubs/market"), default_contracts());

    assert!(
        wait_until(RETRY_DELAY * 20, || attempts.load(Ordering::SeqCst) >= 3).await,
        "expected repeated connect attempts"
    );
    harness.client.stop();
}

// =============================================================================
// Operator Stop
// =============================================================================

#[tokio::test]
async fn stop_while_open_never_reconnects() {
    let hub = MockHub::spawn().await;
    let mut harness = spawn_client(&hub.url(), default_contracts());

    assert!(wait_until(Duration::from_secs(2), || hub.total_subscribes() == 2).await);
    assert_eq!(hub.connection_count(), 1);

    harness.client.stop();

    assert!(
        wait_until(Duration::from_secs(2), || {
            harness.client.state() == ConnectionState::Disconnected
        })
        .await,
        "expected Disconnected after stop"
    );

    // Well past several retry delays: no new connection, no Connecting
    // transition, no reconnect events.
    tokio::time::sleep(RETRY_DELAY * 4).await;
    assert_eq!(hub.connection_count(), 1);
    assert_eq!(drain_reconnecting_count(&mut harness.events), 0);
    assert_eq!(harness.client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn second_stop_is_a_no_op() {
    let hub = MockHub::spawn().await;
    let harness = spawn_client(&hub.url(), default_contracts());

    assert!(wait_until(Duration::from_secs(2), || hub.total_subscribes() == 2).await);

    harness.client.stop();
    harness.client.stop();

    assert!(
        wait_until(Duration::from_secs(2), || {
            harness.client.state() == ConnectionState::Disconnected
        })
        .await
    );
}

// =============================================================================
// Start Idempotence
// =============================================================================

#[tokio::test]
async fn start_twice_produces_a_single_connection() {
    let hub = MockHub::spawn().await;
    let harness = spawn_client(&hub.url(), default_contracts());

    // The harness already called start(); a second call must not spawn a
    // parallel connection loop.
    assert!(!Arc::clone(&harness.client).start());

    assert!(wait_until(Duration::from_secs(2), || hub.total_subscribes() == 2).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hub.connection_count(), 1);

    harness.client.stop();
}

// =============================================================================
// Empty Subscription Set
// =============================================================================

#[tokio::test]
async fn empty_subscription_set_connects_and_receives_nothing() {
    let hub = MockHub::spawn().await;
    let harness = spawn_client(&hub.url(), vec![]);

    assert!(
        wait_until(Duration::from_secs(2), || {
            harness.client.state() == ConnectionState::Open
        })
        .await,
        "expected Open with no subscriptions"
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hub.total_subscribes(), 0);
    assert_eq!(harness.stats.written(), 0);

    harness.client.stop();
}
