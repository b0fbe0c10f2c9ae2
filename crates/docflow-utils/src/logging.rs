//! Tracing initialization for the docflow binary.
//!
//! Structured logging with env-filter support; verbose mode widens the
//! default filter and includes targets so orchestrator internals become
//! visible without recompiling.

use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise the filter defaults to
/// `docflow=info` (or `docflow=debug` when `verbose`).
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("docflow=debug,info")
            } else {
                EnvFilter::try_new("docflow=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_line_number(false)
                .with_file(false)
                .compact(),
        )
        .try_init()?;

    Ok(())
}
