//! Tracing setup.
//!
//! Filtering is read from `COVCTX_LOG` (e.g. `covctx=debug`), defaulting to
//! `info`. Output goes to stderr so reports printed on stdout stay clean.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "COVCTX_LOG";

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}
