//! Tracing setup for embedders.

/// Install the global tracing subscriber, honoring `RUST_LOG` and
/// defaulting to warnings. Call once at process start; a second call is
/// a no-op.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
