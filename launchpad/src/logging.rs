//! Diagnostic tracing for pipeline runs.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. Product output
//! (artifact paths, status lines) is printed to stdout by the CLI and is not
//! affected by the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "launchpad=info,warn";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to step progress from launchpad and warnings
/// from everything else.
///
/// # Example
/// ```bash
/// RUST_LOG=launchpad=debug launchpad build --git git@github.com:acme/shop.git --platform android
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
