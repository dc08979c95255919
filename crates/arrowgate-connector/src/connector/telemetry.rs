//! Log subscriber setup.
//!
//! The connector logs through `tracing` with an `EnvFilter`, so operators
//! tune verbosity with `RUST_LOG` (e.g. `RUST_LOG=arrowgate_connector=debug`).
//! Metrics travel on their own HTTP plane (see [`crate::connector::metrics`]),
//! keeping the tunnel clean for Arrow IPC streaming.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. Call once, before any worker starts.
pub fn init_telemetry() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
