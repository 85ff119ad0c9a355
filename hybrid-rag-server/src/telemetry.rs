//! Logging bootstrap.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Initialize the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to `info`. Setting
/// `LOG_FORMAT=json` switches to one JSON object per line.
///
/// Idempotent: only the first call installs a subscriber.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

        let registry = tracing_subscriber::registry().with(filter);
        if json {
            registry.with(fmt::layer().json().with_current_span(true)).init();
        } else {
            registry.with(fmt::layer().with_target(true)).init();
        }
    });
}
