//! # fxbridge-host — Tracing Setup

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

/// Filter directives for bridge diagnostics, e.g. `FXBRIDGE_LOG=debug`.
pub const LOG_ENV: &str = "FXBRIDGE_LOG";

static INIT: OnceCell<()> = OnceCell::new();

/// Installs a stderr subscriber once per process. A subscriber installed by
/// the embedding application takes precedence and is left alone.
pub fn init(default_directive: &str) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
