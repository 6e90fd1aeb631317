//! Log subscriber setup for the ingestion binary.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    // A subscriber may already be installed (tests, embedding hosts).
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}
