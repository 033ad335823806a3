//! Stream Configuration Settings
//!
//! Configuration types for the live tick recorder, loaded from environment
//! variables with sensible defaults for the gateway's production endpoints.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::subscription::{InstrumentSubscription, SubscriptionSet};
use crate::infrastructure::gateway::auth::{AuthError, GatewayCredentials};
use crate::infrastructure::gateway::reconnect::RetryConfig;

/// Default REST gateway base URL.
const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.topstepx.com";

/// Default real-time market hub URL.
const DEFAULT_MARKET_HUB_URL: &str = "wss://rtc.topstepx.com/hubs/market";

/// Default tick sink path.
const DEFAULT_SINK_PATH: &str = "live_market_data.csv";

/// The contracts streamed when none are configured.
#[must_use]
pub fn default_contracts() -> Vec<InstrumentSubscription> {
    vec![
        InstrumentSubscription::new("F.US.ES", "E-mini S&P"),
        InstrumentSubscription::new("F.US.NQ", "E-mini Nasdaq-100"),
        InstrumentSubscription::new("F.US.GC", "Gold Futures"),
    ]
}

/// REST gateway settings and credentials.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// REST base URL.
    pub base_url: String,
    /// Login credentials.
    pub credentials: GatewayCredentials,
}

impl GatewaySettings {
    /// Load gateway settings from environment variables.
    ///
    /// Reads `TOPSTEP_BASE_URL` (optional), `TOPSTEP_USERNAME` and
    /// `TOPSTEP_API_KEY` (required, non-empty).
    ///
    /// # Errors
    ///
    /// Returns an error when a required credential is missing or empty.
    pub fn from_env() -> Result<Self, AuthError> {
        let base_url = std::env::var("TOPSTEP_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_GATEWAY_BASE_URL.to_owned());
        let username = std::env::var("TOPSTEP_USERNAME").unwrap_or_default();
        let api_key = std::env::var("TOPSTEP_API_KEY").unwrap_or_default();
        Ok(Self {
            base_url,
            credentials: GatewayCredentials::new(username, api_key)?,
        })
    }
}

/// Settings for the streaming client and its sink.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Market hub WebSocket URL.
    pub hub_url: String,
    /// Tick sink CSV path.
    pub sink_path: PathBuf,
    /// Interval between outbound keep-alive pings.
    pub keep_alive_interval: Duration,
    /// Pause between the open event and the first subscribe send.
    pub subscribe_pacing: Duration,
    /// Reconnection policy.
    pub retry: RetryConfig,
    /// Capacity of the bounded tick queue.
    pub queue_capacity: usize,
    /// Contracts to subscribe to, in order.
    pub contracts: Vec<InstrumentSubscription>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            hub_url: DEFAULT_MARKET_HUB_URL.to_owned(),
            sink_path: PathBuf::from(DEFAULT_SINK_PATH),
            keep_alive_interval: Duration::from_secs(15),
            subscribe_pacing: Duration::from_millis(500),
            retry: RetryConfig::fixed(Duration::from_secs(5)),
            queue_capacity: 1024,
            contracts: default_contracts(),
        }
    }
}

impl StreamSettings {
    /// Load stream settings from environment variables, falling back to the
    /// defaults above for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            hub_url: std::env::var("MARKET_HUB_URL").unwrap_or(defaults.hub_url),
            sink_path: std::env::var("MARKET_STREAM_CSV")
                .map_or(defaults.sink_path, PathBuf::from),
            keep_alive_interval: parse_env_duration_secs(
                "MARKET_STREAM_KEEP_ALIVE_SECS",
                defaults.keep_alive_interval,
            ),
            subscribe_pacing: parse_env_duration_millis(
                "MARKET_STREAM_SUBSCRIBE_PACING_MS",
                defaults.subscribe_pacing,
            ),
            retry: RetryConfig::fixed(parse_env_duration_secs(
                "MARKET_STREAM_RECONNECT_DELAY_SECS",
                defaults.retry.delay,
            )),
            queue_capacity: parse_env_usize(
                "MARKET_STREAM_QUEUE_CAPACITY",
                defaults.queue_capacity,
            ),
            contracts: std::env::var("MARKET_STREAM_CONTRACTS")
                .ok()
                .map_or(defaults.contracts, |value| parse_contracts(&value)),
        }
    }

    /// The configured contracts as an ordered subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> SubscriptionSet {
        self.contracts.iter().cloned().collect()
    }
}

/// Parse a contract list of the form
/// `F.US.ES:E-mini S&P,F.US.NQ:E-mini Nasdaq-100`. The name defaults to the
/// symbol when omitted.
fn parse_contracts(value: &str) -> Vec<InstrumentSubscription> {
    value.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((symbol, name)) => InstrumentSubscription::new(symbol.trim(), name.trim()),
            None => InstrumentSubscription::new(entry, entry),
        })
        .collect()
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
