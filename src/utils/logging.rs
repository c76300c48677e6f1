use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` wins when it is set and parses (e.g. `RUST_LOG=brokerlink=debug`);
/// otherwise `default_level` from `logging.level` applies. Unknown level
/// names fall back to `info`.
pub fn init(default_level: &str) {
    let filter = build_filter(default_level, std::env::var(EnvFilter::DEFAULT_ENV).ok());

    // try_init: tests and embedders may call this more than once
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub(crate) fn build_filter(default_level: &str, env_directives: Option<String>) -> EnvFilter {
    env_directives
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level_directive(default_level)))
}

fn level_directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        "off" => "off",
        _ => "info",
    }
}
