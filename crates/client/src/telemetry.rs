use tracing_subscriber::EnvFilter;

/// Initialize tracing for an application embedding this client. `RUST_LOG`
/// wins over the configured level. Call once at startup; calling again is
/// an error from the subscriber, which we ignore.
pub fn init(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}
