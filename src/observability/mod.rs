pub mod token_counter;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `LOG_LEVEL` drives the default filter (case-insensitive; `disabled`
/// installs nothing, `warning` and `critical` alias `warn` and `error`).
/// A set `RUST_LOG` takes precedence over the configured level so per-target
/// filtering stays available.
pub fn init_tracing(log_level: &str) {
    let level = match log_level.to_ascii_lowercase().as_str() {
        "disabled" => return,
        "warning" => "warn".to_string(),
        "critical" => "error".to_string(),
        other => other.to_string(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
