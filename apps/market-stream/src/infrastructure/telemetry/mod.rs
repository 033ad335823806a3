//! Tracing Initialization
//!
//! Console logging with an environment-driven filter. `RUST_LOG` overrides
//! the defaults.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// Safe to call once per process; a second call is a no-op because the
/// global subscriber is already set.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info")
            .add_directive(
                "tungstenite=warn"
                    .parse()
                    .expect("static directive 'tungstenite=warn' is valid"),
            )
            .add_directive(
                "hyper=warn"
                    .parse()
                    .expect("static directive 'hyper=warn' is valid"),
            )
            .add_directive(
                "reqwest=warn"
                    .parse()
                    .expect("static directive 'reqwest=warn' is valid"),
            )
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
