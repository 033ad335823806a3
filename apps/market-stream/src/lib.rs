#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::default_trait_access
    )
)]

//! Market Stream - Resilient Live Tick Recorder
//!
//! Maintains one long-lived connection to the gateway's real-time market
//! hub, keeps all configured instrument subscriptions active across
//! reconnects, and appends every received quote to a CSV sink.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core streaming types
//!   - `subscription`: Instrument descriptors and the startup-fixed set
//!   - `tick`: Tick records and sink row formatting
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `gateway`: REST auth client and the market hub client
//!   - `sink`: CSV persistence and the ordered writer task
//!   - `config`: Environment-driven settings
//!   - `telemetry`: Tracing initialization
//!
//! # Data Flow
//!
//! ```text
//! Market Hub WS ──► MarketHubClient ──► bounded queue ──► TickWriter ──► CSV
//!                        │
//!                        └──► lifecycle events (connect / reconnect / stop)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no transport dependencies.
pub mod domain;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::subscription::{InstrumentSubscription, MarketField, SubscriptionSet, Symbol};
pub use domain::tick::{SINK_HEADER, TickRecord};

// Gateway
pub use infrastructure::gateway::auth::{
    Account, AuthError, GatewayAuthClient, GatewayCredentials, SessionToken,
};
pub use infrastructure::gateway::hub::{
    ConnectionState, DisconnectReason, HubClientConfig, HubClientError, HubEvent, MarketHubClient,
};
pub use infrastructure::gateway::reconnect::{RetryConfig, RetryPolicy};

// Sink
pub use infrastructure::sink::{CsvTickSink, SinkError, TickSink, TickWriter, WriterStats};

// Config
pub use infrastructure::config::{GatewaySettings, StreamSettings, default_contracts};
