//! Infrastructure layer - Adapters and external integrations.

/// Gateway adapters: REST auth and the real-time market hub client.
pub mod gateway;

/// Tick sink: CSV persistence and the ordered writer task.
pub mod sink;

/// Configuration loaded from environment variables.
pub mod config;

/// Tracing initialization.
pub mod telemetry;
