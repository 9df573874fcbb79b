use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initializes the logging subsystem: compact stdout output filtered by
/// `RUST_LOG`.
pub(crate) fn init() {
    let filter = EnvFilter::from_default_env();

    let stdout = tracing_subscriber::fmt::layer().compact().with_filter(filter);

    tracing_subscriber::registry().with(stdout).init();

    info!("logging started");
}
