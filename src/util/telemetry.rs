//! Structured logging setup for hosts embedding the resiliency core.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "SLEEPLOG_LOG";

/// Directive used when [`LOG_ENV`] is unset or unparsable.
pub const DEFAULT_LOG_DIRECTIVE: &str = "sleeplog_resilience=info";

/// Install a formatting subscriber filtered by [`LOG_ENV`].
///
/// Returns `false` when the host already installed a global subscriber.
pub fn init_tracing() -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
