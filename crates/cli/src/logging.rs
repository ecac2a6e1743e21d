use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Parse a config log level, falling back to `info`
pub fn parse_level(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}

/// Install a compact stderr logger. RUST_LOG overrides `default_level`.
///
/// Stdout is left alone so command output stays pipeable.
pub fn init_logging(default_level: &str) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(parse_level(default_level).into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    // a second init (e.g. in tests) is harmless
    let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
}
