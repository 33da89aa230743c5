use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "YT_SENTIMENT_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Installs the global subscriber. Output goes to stderr so it never mixes
/// with the report on stdout. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();
}
