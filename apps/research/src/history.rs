//! Historical Bar Retrieval
//!
//! Fetches daily OHLCV bars per contract from the gateway REST API
//! (`POST /api/History/retrieveBars`) and writes one raw CSV for the
//! feature step. A straight fetch-and-save operation: request pacing only,
//! no scheduling.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use market_stream::SessionToken;

/// Pause between per-contract history requests.
const REQUEST_PACING: Duration = Duration::from_millis(250);

/// Request timeout for history calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bar aggregation unit for daily bars, per the gateway's enum.
const UNIT_DAY: u8 = 4;

/// Errors from history retrieval.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Network or protocol failure.
    #[error("history request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("history endpoint returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// The gateway rejected the request.
    #[error("history request rejected: {0}")]
    Rejected(String),

    /// CSV output failure.
    #[error("raw CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem failure.
    #[error("raw CSV I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveBarsRequest<'a> {
    contract_id: &'a str,
    live: bool,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    unit: u8,
    unit_number: u32,
    limit: u32,
    include_partial_bar: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveBarsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    bars: Vec<Bar>,
    #[serde(default)]
    error_message: Option<String>,
}

/// One OHLCV bar as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Bar {
    /// Bar start time.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    /// Open price.
    #[serde(rename = "o")]
    pub open: f64,
    /// High price.
    #[serde(rename = "h")]
    pub high: f64,
    /// Low price.
    #[serde(rename = "l")]
    pub low: f64,
    /// Close price.
    #[serde(rename = "c")]
    pub close: f64,
    /// Traded volume.
    #[serde(rename = "v")]
    pub volume: f64,
}

/// One row of the raw history CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// Bar start time (RFC 3339).
    pub timestamp: DateTime<Utc>,
    /// Contract symbol.
    pub symbol: String,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Traded volume.
    pub volume: f64,
}

// =============================================================================
// History Client
// =============================================================================

/// REST client for the gateway history API.
pub struct HistoryClient {
    http: reqwest::Client,
    base_url: String,
    token: SessionToken,
}

impl HistoryClient {
    /// Create a history client over an authenticated session.
    pub fn new(base_url: impl Into<String>, token: SessionToken) -> Result<Self, HistoryError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token,
        })
    }

    /// Retrieve daily bars for one contract over `[start, end]`.
    pub async fn retrieve_daily_bars(
        &self,
        contract_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, HistoryError> {
        let url = format!("{}/api/History/retrieveBars", self.base_url);
        let request = RetrieveBarsRequest {
            contract_id,
            live: false,
            start_time: start,
            end_time: end,
            unit: UNIT_DAY,
            unit_number: 1,
            limit: 20_000,
            include_partial_bar: false,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token.as_str())
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HistoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RetrieveBarsResponse = response.json().await?;
        if !parsed.success {
            return Err(HistoryError::Rejected(
                parsed
                    .error_message
                    .unwrap_or_else(|| "no error message".to_owned()),
            ));
        }

        let mut bars = parsed.bars;
        bars.sort_by_key(|bar| bar.timestamp);
        tracing::info!(contract = contract_id, bars = bars.len(), "history fetched");
        Ok(bars)
    }

    /// Fetch daily bars for every contract, oldest first, pacing requests.
    pub async fn retrieve_all(
        &self,
        contract_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawRow>, HistoryError> {
        let mut rows = Vec::new();
        for (i, contract_id) in contract_ids.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(REQUEST_PACING).await;
            }
            let bars = self.retrieve_daily_bars(contract_id, start, end).await?;
            rows.extend(bars.into_iter().map(|bar| RawRow {
                timestamp: bar.timestamp,
                symbol: contract_id.clone(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }));
        }
        Ok(rows)
    }
}

// =============================================================================
// Raw CSV
// =============================================================================

/// Write the raw history CSV, creating parent directories as needed.
pub fn write_raw_csv(path: impl AsRef<Path>, rows: &[RawRow]) -> Result<(), HistoryError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read the raw history CSV.
pub fn read_raw_csv(path: impl AsRef<Path>) -> Result<Vec<RawRow>, HistoryError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}
