//! Gateway Adapters
//!
//! Everything that talks to the broker gateway: the REST auth client and
//! the real-time market hub client.

/// REST authentication: login and account search.
pub mod auth;

/// Hub frame codec (record-separated JSON).
pub mod codec;

/// Market hub client and connection state machine.
pub mod hub;

/// Hub wire types.
pub mod messages;

/// Reconnection policy.
pub mod reconnect;
