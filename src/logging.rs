use std::path::Path;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const DEFAULT_FILTER: &str = "bookdeck=info";

fn resolve_env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("BOOKDECK_LOG")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
}

/// Logs to stderr, leaving stdout to command output.
pub fn init_stderr() {
    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(resolve_env_filter())
        .with(layer)
        .try_init();
}

/// Logs to a daily file under `dir`; the chat UI owns the terminal.
pub fn init_file(dir: &Path) {
    if !dir.as_os_str().is_empty() {
        let _ = std::fs::create_dir_all(dir);
    }
    let writer = tracing_appender::rolling::daily(dir, "bookdeck.log");
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(writer);
    let _ = tracing_subscriber::registry()
        .with(resolve_env_filter())
        .with(layer)
        .try_init();
}
