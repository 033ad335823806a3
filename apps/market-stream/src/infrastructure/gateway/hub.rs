//! Market Hub Client
//!
//! Maintains one long-lived connection to the gateway's real-time market
//! hub, keeps all configured instrument subscriptions active across
//! reconnects, and forwards every inbound tick to the sink queue.
//!
//! # Connection lifecycle
//!
//! ```text
//! Disconnected ──start/retry──► Connecting ──handshake ok──► Open
//!       ▲                           │                          │
//!       │◄──────── error ───────────┘                          │
//!       │◄──────── transport error / server close ─────────────┤
//!       │                                                      │ stop()
//!       └──────────────────────── Closing ◄────────────────────┘
//! ```
//!
//! Every failure path re-enters `Connecting` after the configured retry
//! delay, forever, until `stop()` is called. The operator-stop path never
//! reconnects; merging it with the error path would make the process
//! reconnect immediately after an intentional shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::domain::subscription::{InstrumentSubscription, SubscriptionSet, Symbol};
use crate::domain::tick::TickRecord;

use super::codec::{CodecError, HubFrameCodec};
use super::messages::{
    CloseFrame, HubFrame, InvocationFrame, MarketDataMessage, TARGET_MARKET_DATA,
};
use super::reconnect::{RetryConfig, RetryPolicy};

// =============================================================================
// Connection State
// =============================================================================

/// Observable state of the hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport, no activity.
    #[default]
    Disconnected,
    /// Transport handshake in progress.
    Connecting,
    /// Handshake complete, subscriptions active.
    Open,
    /// Operator stop in progress; will not reconnect.
    Closing,
}

impl ConnectionState {
    /// State name for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }

    /// Check whether the connection is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

// =============================================================================
// Errors and Events
// =============================================================================

/// Why an open connection was lost.
#[derive(Debug, Clone)]
pub enum DisconnectReason {
    /// The server initiated the close (hub close frame or WebSocket close).
    ServerClose(Option<String>),
    /// The stream ended without a close frame.
    StreamEnded,
    /// A network-level transport error.
    Transport(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerClose(Some(reason)) => write!(f, "server close: {reason}"),
            Self::ServerClose(None) => write!(f, "server close"),
            Self::StreamEnded => write!(f, "stream ended"),
            Self::Transport(error) => write!(f, "transport error: {error}"),
        }
    }
}

/// Errors surfaced by the hub client.
///
/// None of these are fatal to the process: transport failures feed the
/// reconnect loop, and subscription send failures are resolved by the next
/// full re-subscribe. Only construction-time misconfiguration reaches the
/// caller directly.
#[derive(Debug, thiserror::Error)]
pub enum HubClientError {
    /// Invalid construction input (empty token, malformed URL).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Transport or protocol handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// An open connection was lost.
    #[error("transport closed: {0}")]
    TransportClosed(DisconnectReason),

    /// A subscribe control message could not be sent. Non-fatal: logged,
    /// and resolved by the next reconnect's full re-subscribe.
    #[error("subscription send failed for {symbol}: {reason}")]
    SubscriptionSendFailed {
        /// Symbol whose subscribe send failed.
        symbol: Symbol,
        /// Send failure description.
        reason: String,
    },

    /// Frame encoding/decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A configured attempt limit was exhausted.
    #[error("reconnect attempts exhausted after {0} attempts")]
    RetriesExhausted(u32),
}

/// Lifecycle events emitted by the client.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// Handshake complete; re-subscription follows.
    Connected,
    /// A subscribe message was sent for a symbol (send, not server ack).
    SubscribeSent {
        /// Subscribed symbol.
        symbol: Symbol,
    },
    /// The connection was lost.
    Disconnected {
        /// Human-readable loss reason.
        reason: String,
    },
    /// A reconnect attempt is scheduled.
    Reconnecting {
        /// Attempt number since the last successful connection.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// The client stopped on operator request.
    Stopped,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the hub client.
#[derive(Debug, Clone)]
pub struct HubClientConfig {
    /// Hub WebSocket URL.
    pub url: String,
    /// Bearer session token, appended as `access_token`.
    pub token: String,
    /// Interval between outbound keep-alive pings.
    pub keep_alive_interval: Duration,
    /// Pause between the open event and the first subscribe send. Real hub
    /// backends drop subscribes issued in the same instant as the open.
    pub subscribe_pacing: Duration,
    /// Reconnection policy.
    pub retry: RetryConfig,
}

impl HubClientConfig {
    /// Create a configuration, validating the URL and token.
    ///
    /// # Errors
    ///
    /// Returns [`HubClientError::Config`] for an empty token or a URL that
    /// is not a WebSocket endpoint.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self, HubClientError> {
        let url = url.into();
        let token = token.into();

        if token.is_empty() {
            return Err(HubClientError::Config("session token is empty".to_owned()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(HubClientError::Config(format!(
                "hub URL must be a ws:// or wss:// endpoint, got {url}"
            )));
        }

        Ok(Self {
            url,
            token,
            keep_alive_interval: Duration::from_secs(15),
            subscribe_pacing: Duration::from_millis(500),
            retry: RetryConfig::default(),
        })
    }

    /// Set the keep-alive interval.
    #[must_use]
    pub const fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Set the subscribe pacing delay.
    #[must_use]
    pub const fn with_subscribe_pacing(mut self, pacing: Duration) -> Self {
        self.subscribe_pacing = pacing;
        self
    }

    /// Set the reconnection policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

// =============================================================================
// Client
// =============================================================================

/// Resilient market hub subscription client.
///
/// Created in `Disconnected` state; no network activity happens until
/// [`MarketHubClient::start`]. Ticks go to the bounded sink queue, lifecycle
/// events to the event channel. Control calls must be serialized by the
/// caller; the object itself is not a concurrency guard for `start`/`stop`
/// races.
pub struct MarketHubClient {
    config: HubClientConfig,
    subscriptions: SubscriptionSet,
    codec: HubFrameCodec,
    state: parking_lot::RwLock<ConnectionState>,
    started: AtomicBool,
    ticks_dropped: AtomicU64,
    tick_tx: mpsc::Sender<TickRecord>,
    event_tx: mpsc::Sender<HubEvent>,
    cancel: CancellationToken,
}

impl MarketHubClient {
    /// Create a new client in `Disconnected` state.
    #[must_use]
    pub fn new(
        config: HubClientConfig,
        subscriptions: SubscriptionSet,
        tick_tx: mpsc::Sender<TickRecord>,
        event_tx: mpsc::Sender<HubEvent>,
        cancel: CancellationToken,
    ) -> Self {
        if subscriptions.is_empty() {
            tracing::warn!("no subscriptions configured: the client will connect and receive nothing");
        }
        Self {
            config,
            subscriptions,
            codec: HubFrameCodec::new(),
            state: parking_lot::RwLock::new(ConnectionState::Disconnected),
            started: AtomicBool::new(false),
            ticks_dropped: AtomicU64::new(0),
            tick_tx,
            event_tx,
            cancel,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Ticks dropped because the sink queue was full or closed.
    #[must_use]
    pub fn ticks_dropped(&self) -> u64 {
        self.ticks_dropped.load(Ordering::Relaxed)
    }

    /// Start the connection loop on the current runtime.
    ///
    /// Idempotent: a second call while running is a no-op and returns
    /// `false`. Exactly one connection loop runs per client.
    pub fn start(self: Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("start ignored: client already running");
            return false;
        }
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!(error = %e, "market hub client terminated");
            }
        });
        true
    }

    /// Request an operator stop.
    ///
    /// Cancels the active connection attempt or open connection and
    /// suppresses all further reconnect attempts. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Run the connection loop until stopped.
    ///
    /// Any transport-level close or error (including a failed connect
    /// attempt) logs the event, waits the configured delay, and retries.
    pub async fn run(self: Arc<Self>) -> Result<(), HubClientError> {
        let mut policy = RetryPolicy::new(self.config.retry.clone());

        loop {
            if self.cancel.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                let _ = self.event_tx.send(HubEvent::Stopped).await;
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            match self.connect_and_stream(&mut policy).await {
                Ok(()) => {
                    // Operator stop: no reconnect.
                    self.set_state(ConnectionState::Disconnected);
                    tracing::info!("market hub client stopped");
                    let _ = self.event_tx.send(HubEvent::Stopped).await;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "market hub connection lost");
                    self.set_state(ConnectionState::Disconnected);
                    let _ = self
                        .event_tx
                        .send(HubEvent::Disconnected {
                            reason: e.to_string(),
                        })
                        .await;

                    let Some(delay) = policy.next_delay() else {
                        return Err(HubClientError::RetriesExhausted(policy.attempt_count()));
                    };
                    let attempt = policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "reconnecting to market hub"
                    );
                    let _ = self
                        .event_tx
                        .send(HubEvent::Reconnecting { attempt, delay })
                        .await;

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            self.set_state(ConnectionState::Disconnected);
                            let _ = self.event_tx.send(HubEvent::Stopped).await;
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect, handshake, re-subscribe, and stream until an error or stop.
    ///
    /// `Ok(())` means operator stop; every error feeds the reconnect loop.
    async fn connect_and_stream(&self, policy: &mut RetryPolicy) -> Result<(), HubClientError> {
        tracing::info!(url = %self.config.url, "connecting to market hub");

        let connect = tokio_tungstenite::connect_async(self.connect_url());
        let ws_stream = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = connect => {
                let (ws_stream, _response) =
                    result.map_err(|e| HubClientError::HandshakeFailed(e.to_string()))?;
                ws_stream
            }
        };

        let (mut write, mut read) = ws_stream.split();

        // Protocol handshake.
        let handshake = self.codec.encode_handshake()?;
        write
            .send(Message::Text(handshake.into()))
            .await
            .map_err(|e| HubClientError::HandshakeFailed(e.to_string()))?;

        let payload = loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => break text,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(HubClientError::HandshakeFailed(e.to_string())),
                    None => {
                        return Err(HubClientError::HandshakeFailed(
                            "stream ended before handshake response".to_owned(),
                        ));
                    }
                }
            }
        };

        let records = self.codec.split_records(&payload);
        let Some((first, rest)) = records.split_first() else {
            return Err(HubClientError::HandshakeFailed(
                "empty handshake payload".to_owned(),
            ));
        };
        let response = self.codec.decode_handshake(first)?;
        if let Some(error) = response.error {
            return Err(HubClientError::HandshakeFailed(error));
        }

        self.set_state(ConnectionState::Open);
        policy.reset();
        tracing::info!("connected to market hub");
        let _ = self.event_tx.send(HubEvent::Connected).await;

        // Pacing before the first subscribe send.
        tokio::select! {
            () = self.cancel.cancelled() => {
                return self.close_transport(&mut write).await;
            }
            () = tokio::time::sleep(self.config.subscribe_pacing) => {}
        }

        // Subscriptions are not cumulative across reconnects; reissue all
        // descriptors, in configured order, on every open transition.
        for subscription in &self.subscriptions {
            match self.send_subscribe(&mut write, subscription).await {
                Ok(()) => {
                    tracing::info!(
                        symbol = %subscription.symbol(),
                        name = %subscription.name(),
                        "subscribe sent"
                    );
                    let _ = self
                        .event_tx
                        .send(HubEvent::SubscribeSent {
                            symbol: subscription.symbol().to_owned(),
                        })
                        .await;
                }
                Err(e) => tracing::warn!(error = %e, "subscribe send failed"),
            }
        }

        // Frames that rode in with the handshake response.
        for record in rest {
            self.handle_record(record)?;
        }

        let mut keep_alive = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.keep_alive_interval,
            self.config.keep_alive_interval,
        );
        keep_alive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    return self.close_transport(&mut write).await;
                }
                _ = keep_alive.tick() => {
                    let ping = self.codec.encode_ping()?;
                    write.send(Message::Text(ping.into())).await.map_err(|e| {
                        HubClientError::TransportClosed(DisconnectReason::Transport(e.to_string()))
                    })?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        for record in self.codec.split_records(&text) {
                            self.handle_record(record)?;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await.map_err(|e| {
                            HubClientError::TransportClosed(DisconnectReason::Transport(e.to_string()))
                        })?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Err(HubClientError::TransportClosed(DisconnectReason::ServerClose(
                            frame.map(|f| f.reason.to_string()),
                        )));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(HubClientError::TransportClosed(
                            DisconnectReason::Transport(e.to_string()),
                        ));
                    }
                    None => {
                        return Err(HubClientError::TransportClosed(DisconnectReason::StreamEnded));
                    }
                }
            }
        }
    }

    /// Operator-stop close: hub close frame, then transport close.
    async fn close_transport<W>(&self, write: &mut W) -> Result<(), HubClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        self.set_state(ConnectionState::Closing);
        tracing::info!("stop requested, closing market hub connection");
        if let Ok(frame) = self.codec.encode(&CloseFrame::new()) {
            let _ = write.send(Message::Text(frame.into())).await;
        }
        let _ = write.send(Message::Close(None)).await;
        Ok(())
    }

    /// Send one `SubscribeSymbols` invocation.
    async fn send_subscribe<W>(
        &self,
        write: &mut W,
        subscription: &InstrumentSubscription,
    ) -> Result<(), HubClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let frame = InvocationFrame::subscribe_symbols(subscription).map_err(|e| {
            HubClientError::SubscriptionSendFailed {
                symbol: subscription.symbol().to_owned(),
                reason: e.to_string(),
            }
        })?;
        let text = self.codec.encode(&frame)?;
        write.send(Message::Text(text.into())).await.map_err(|e| {
            HubClientError::SubscriptionSendFailed {
                symbol: subscription.symbol().to_owned(),
                reason: e.to_string(),
            }
        })
    }

    /// Decode and act on one inbound frame record.
    fn handle_record(&self, record: &str) -> Result<(), HubClientError> {
        match self.codec.decode_frame(record) {
            Ok(HubFrame::Invocation(invocation)) => {
                self.handle_invocation(&invocation);
                Ok(())
            }
            Ok(HubFrame::Ping) => Ok(()),
            Ok(HubFrame::Close(close)) => Err(HubClientError::TransportClosed(
                DisconnectReason::ServerClose(close.error),
            )),
            Ok(HubFrame::Other(frame_type)) => {
                tracing::trace!(frame_type, "ignoring unhandled frame type");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding undecodable frame");
                Ok(())
            }
        }
    }

    /// Dispatch the arguments of a `MarketData` invocation.
    fn handle_invocation(&self, invocation: &InvocationFrame) {
        if invocation.target != TARGET_MARKET_DATA {
            tracing::trace!(target = %invocation.target, "ignoring invocation target");
            return;
        }
        for argument in &invocation.arguments {
            match serde_json::from_value::<MarketDataMessage>(argument.clone()) {
                Ok(message) => {
                    // Capture time is stamped locally: the feed does not
                    // guarantee timestamp presence.
                    self.dispatch_tick(message.to_record(Utc::now()));
                }
                Err(e) => tracing::warn!(error = %e, "discarding malformed market data"),
            }
        }
    }

    /// Hand a tick to the sink queue without blocking the read loop.
    ///
    /// Overflow policy: drop the incoming record and count it. The counter
    /// and the warn line keep the loss explicit.
    fn dispatch_tick(&self, record: TickRecord) {
        tracing::info!(
            symbol = %record.symbol,
            last = ?record.last_price,
            bid = ?record.bid,
            ask = ?record.ask,
            volume = ?record.volume,
            "tick"
        );
        if let Err(e) = self.tick_tx.try_send(record) {
            let dropped = self.ticks_dropped.fetch_add(1, Ordering::Relaxed) + 1;
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!(dropped_total = dropped, "tick queue full, record dropped");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::warn!(dropped_total = dropped, "tick queue closed, record dropped");
                }
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != next {
            tracing::debug!(from = state.as_str(), to = next.as_str(), "connection state");
            *state = next;
        }
    }

    fn connect_url(&self) -> String {
        let separator = if self.config.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}access_token={}",
            self.config.url, separator, self.config.token
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::InstrumentSubscription;
    use rust_decimal::Decimal;

    fn test_client(tick_capacity: usize) -> (Arc<MarketHubClient>, mpsc::Receiver<TickRecord>) {
        let config = HubClientConfig::new("wss://example.invalid/hubs/market", "token").unwrap();
        let (tick_tx, tick_rx) = mpsc::channel(tick_capacity);
        let (event_tx, _event_rx) = mpsc::channel(16);
        let client = MarketHubClient::new(
            config,
            SubscriptionSet::new(vec![InstrumentSubscription::new("F.US.ES", "E-mini S&P")]),
            tick_tx,
            event_tx,
            CancellationToken::new(),
        );
        (Arc::new(client), tick_rx)
    }

    #[test]
    fn config_rejects_empty_token() {
        let result = HubClientConfig::new("wss://example.invalid/hubs/market", "");
        assert!(matches!(result, Err(HubClientError::Config(_))));
    }

    #[test]
    fn config_rejects_non_websocket_url() {
        let result = HubClientConfig::new("https://example.invalid/hubs/market", "token");
        assert!(matches!(result, Err(HubClientError::Config(_))));
    }

    #[test]
    fn client_starts_disconnected() {
        let (client, _rx) = test_client(4);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.ticks_dropped(), 0);
    }

    #[test]
    fn connect_url_appends_access_token() {
        let (client, _rx) = test_client(4);
        assert_eq!(
            client.connect_url(),
            "wss://example.invalid/hubs/market?access_token=token"
        );
    }

    #[test]
    fn market_data_invocation_dispatches_tick() {
        let (client, mut rx) = test_client(4);
        let record = r#"{"type":1,"target":"MarketData","arguments":[{"Symbol":"F.US.ES","LastPrice":4390.25,"Volume":10}]}"#;
        client.handle_record(record).unwrap();

        let tick = rx.try_recv().unwrap();
        assert_eq!(tick.symbol, "F.US.ES");
        assert_eq!(tick.last_price, Some(Decimal::new(439_025, 2)));
        assert_eq!(tick.bid, None);
        assert_eq!(tick.volume, Some(10));
    }

    #[test]
    fn close_frame_surfaces_server_close() {
        let (client, _rx) = test_client(4);
        let err = client
            .handle_record(r#"{"type":7,"error":"maintenance"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            HubClientError::TransportClosed(DisconnectReason::ServerClose(Some(_)))
        ));
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let (client, mut rx) = test_client(1);
        let record = r#"{"type":1,"target":"MarketData","arguments":[{"Symbol":"F.US.ES","LastPrice":1.0}]}"#;

        client.handle_record(record).unwrap();
        client.handle_record(record).unwrap();
        assert_eq!(client.ticks_dropped(), 1);

        // The first record is still queued in order.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn foreign_invocation_targets_are_ignored() {
        let (client, mut rx) = test_client(4);
        let record = r#"{"type":1,"target":"GatewayDepth","arguments":[{"Symbol":"F.US.ES"}]}"#;
        client.handle_record(record).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let (client, _rx) = test_client(4);
        // The URL is unroutable; only the spawn accounting matters here.
        assert!(Arc::clone(&client).start());
        assert!(!Arc::clone(&client).start());
        client.stop();
    }

    #[test]
    fn stop_is_idempotent_while_disconnected() {
        let (client, _rx) = test_client(4);
        client.stop();
        client.stop();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
