//! Test logging setup.
//!
//! Scenarios report every executed step through `tracing`. Tests that want to
//! see those lines call [`init_test_logging`] once; the filter comes from the
//! `STEPWISE_LOG` environment variable and defaults to `info`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "STEPWISE_LOG";

/// Target used for the per-step diagnostic lines.
pub const STEP_TARGET: &str = "stepwise::step";

/// Installs a compact fmt subscriber writing through the test writer.
///
/// Returns `false` when a global subscriber was already installed, which makes
/// repeated calls from several tests harmless.
pub fn init_test_logging() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
