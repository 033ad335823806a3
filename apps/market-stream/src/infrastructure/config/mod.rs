//! Configuration
//!
//! Settings loaded from environment variables.

mod settings;

pub use settings::{GatewaySettings, StreamSettings, default_contracts};
