//! Market Stream Binary
//!
//! Logs into the gateway, verifies an active account, and streams live
//! market data for the configured contracts into the CSV sink until
//! interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p market-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TOPSTEP_USERNAME`: Gateway account username
//! - `TOPSTEP_API_KEY`: Gateway API key
//!
//! ## Optional
//! - `TOPSTEP_BASE_URL`: REST base URL (default: <https://api.topstepx.com>)
//! - `MARKET_HUB_URL`: Market hub URL (default: wss://rtc.topstepx.com/hubs/market)
//! - `MARKET_STREAM_CSV`: Tick sink path (default: live_market_data.csv)
//! - `MARKET_STREAM_CONTRACTS`: `SYMBOL:Name` pairs, comma separated
//! - `MARKET_STREAM_RECONNECT_DELAY_SECS`: Reconnect delay (default: 5)
//! - `MARKET_STREAM_KEEP_ALIVE_SECS`: Keep-alive interval (default: 15)
//! - `MARKET_STREAM_QUEUE_CAPACITY`: Tick queue capacity (default: 1024)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use market_stream::infrastructure::telemetry;
use market_stream::{
    CsvTickSink, GatewayAuthClient, GatewaySettings, HubClientConfig, HubEvent, MarketHubClient,
    StreamSettings, TickWriter,
};

/// Time allowed for the writer to drain after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    telemetry::init();

    tracing::info!("starting market stream");

    let gateway = GatewaySettings::from_env().context("gateway credentials")?;
    let settings = StreamSettings::from_env();
    log_settings(&settings);

    // Auth failures are fatal: without a token no streaming is attempted.
    let auth = GatewayAuthClient::new(gateway.base_url.clone(), gateway.credentials)?;
    let token = auth.login().await.context("gateway login")?;
    let accounts = auth.search_active_accounts(&token).await?;
    let Some(account) = accounts.first() else {
        anyhow::bail!("no active accounts found");
    };
    tracing::info!(account_id = account.id, name = %account.name, "active account");

    let shutdown = CancellationToken::new();

    // Sink and writer task.
    let sink = CsvTickSink::open(&settings.sink_path)
        .with_context(|| format!("opening sink {}", settings.sink_path.display()))?;
    let (tick_tx, tick_rx) = mpsc::channel(settings.queue_capacity);
    let (writer, writer_stats) = TickWriter::new(sink, tick_rx, shutdown.clone());
    let writer_handle = tokio::spawn(writer.run());

    // Hub client.
    let config = HubClientConfig::new(settings.hub_url.clone(), token.into_inner())?
        .with_keep_alive(settings.keep_alive_interval)
        .with_subscribe_pacing(settings.subscribe_pacing)
        .with_retry(settings.retry.clone());
    let (event_tx, event_rx) = mpsc::channel(256);
    let client = Arc::new(MarketHubClient::new(
        config,
        settings.subscriptions(),
        tick_tx,
        event_tx,
        shutdown.clone(),
    ));

    tokio::spawn(handle_hub_events(event_rx));
    Arc::clone(&client).start();

    await_shutdown().await;

    client.stop();
    let _ = tokio::time::timeout(DRAIN_TIMEOUT, writer_handle).await;

    tracing::info!(
        written = writer_stats.written(),
        failed = writer_stats.failed(),
        dropped = client.ticks_dropped(),
        "market stream stopped"
    );
    Ok(())
}

/// Log lifecycle events from the hub client.
async fn handle_hub_events(mut rx: mpsc::Receiver<HubEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            HubEvent::Connected => {
                tracing::info!("market hub connected");
            }
            HubEvent::SubscribeSent { symbol } => {
                tracing::debug!(symbol = %symbol, "subscription active");
            }
            HubEvent::Disconnected { reason } => {
                tracing::warn!(reason = %reason, "market hub disconnected");
            }
            HubEvent::Reconnecting { attempt, delay } => {
                tracing::info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "market hub reconnecting"
                );
            }
            HubEvent::Stopped => {
                tracing::info!("market hub client stopped");
            }
        }
    }
}

/// Log the parsed configuration.
fn log_settings(settings: &StreamSettings) {
    tracing::info!(
        hub_url = %settings.hub_url,
        sink = %settings.sink_path.display(),
        contracts = settings.contracts.len(),
        reconnect_delay_secs = settings.retry.delay.as_secs(),
        "configuration loaded"
    );
}

/// Load .env from the current directory or any ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received Ctrl+C, stopping market stream");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, stopping market stream");
        }
    }
}
