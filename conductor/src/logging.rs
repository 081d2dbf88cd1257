//! Tracing setup for the `conductor` and `eval` binaries.
//!
//! Tracing output is diagnostics only. The durable metrics log
//! (`io/metrics_log`) and per-run files (`io/run_log`) under `.conductor/`
//! are the product artifacts; `RUST_LOG` never changes what they contain.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directive used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the stderr subscriber with [`DEFAULT_DIRECTIVE`].
///
/// ```bash
/// RUST_LOG=conductor::pipeline=debug conductor run "Fix the login bug"
/// ```
pub fn init() {
    init_with_default(DEFAULT_DIRECTIVE);
}

/// Install the stderr subscriber, falling back to `directive` when `RUST_LOG`
/// is unset. A second call is a no-op.
pub fn init_with_default(directive: &str) {
    let installed = tracing_subscriber::registry()
        .with(env_filter(directive))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
}
