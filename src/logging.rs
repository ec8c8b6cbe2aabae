use tracing_subscriber::EnvFilter;

/// Installs the process-wide `tracing` subscriber, writing to stderr.
///
/// The filter defaults to `info` and can be narrowed or widened with
/// `RUST_LOG`. Calling this twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
