//! Logging setup for binaries embedding the session.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a global `tracing` subscriber: `RUST_LOG`-style filtering
/// (default `info`) and the fmt layer.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
