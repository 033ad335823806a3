//! Fetch History Binary
//!
//! Downloads daily bars for the configured contracts from the gateway and
//! saves them as the raw history CSV.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p research --bin fetch-history
//! ```
//!
//! # Environment Variables
//!
//! - `TOPSTEP_USERNAME`, `TOPSTEP_API_KEY`: gateway credentials (required)
//! - `TOPSTEP_BASE_URL`: REST base URL (default: <https://api.topstepx.com>)
//! - `MARKET_STREAM_CONTRACTS`: `SYMBOL:Name` pairs, comma separated
//! - `RESEARCH_RAW_CSV`: output path (default: data/raw/market_history.csv)
//! - `RESEARCH_LOOKBACK_DAYS`: lookback window (default: 3650)

use anyhow::Context;
use chrono::{Duration, Utc};

use market_stream::infrastructure::telemetry;
use market_stream::{GatewayAuthClient, GatewaySettings, StreamSettings};
use research::history::{HistoryClient, write_raw_csv};
use research::settings::ResearchSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init();

    let gateway = GatewaySettings::from_env().context("gateway credentials")?;
    let settings = ResearchSettings::from_env();
    let contracts: Vec<String> = StreamSettings::from_env()
        .contracts
        .iter()
        .map(|c| c.symbol().to_owned())
        .collect();

    tracing::info!(
        contracts = contracts.len(),
        lookback_days = settings.lookback_days,
        output = %settings.raw_csv.display(),
        "fetching history"
    );

    let auth = GatewayAuthClient::new(gateway.base_url.clone(), gateway.credentials)?;
    let token = auth.login().await.context("gateway login")?;

    let end = Utc::now();
    let start = end - Duration::days(settings.lookback_days);

    let client = HistoryClient::new(gateway.base_url, token)?;
    let rows = client.retrieve_all(&contracts, start, end).await?;

    write_raw_csv(&settings.raw_csv, &rows)
        .with_context(|| format!("writing {}", settings.raw_csv.display()))?;

    tracing::info!(rows = rows.len(), path = %settings.raw_csv.display(), "raw history saved");
    Ok(())
}
