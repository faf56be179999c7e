use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// Install the global tracing subscriber. The filter comes from
// RUST_LOG, debug builds trace everything from the daemon otherwise
pub fn init_logging() {
    let level = if cfg!(debug_assertions) {
        "bmcfand=trace,info"
    } else {
        "info"
    };

    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(f) => (f, true),
        Err(_) => (EnvFilter::new(level), false),
    };

    let fmt_layer = fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    // Only reported once the subscriber is there to record it
    if !from_env {
        info!("\"RUST_LOG\" variable not set, defaulting to {level}");
    }
}
