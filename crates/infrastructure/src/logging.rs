use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigError, LogFormat, LogLevel};

/// Filter directive for `level`, with the aya loader kept at `warn` unless
/// tracing is requested.
pub fn default_directive(level: LogLevel) -> String {
    match level {
        LogLevel::Trace => level.as_str().to_string(),
        _ => format!("{},aya=warn", level.as_str()),
    }
}

/// Install the global subscriber writing to stdout.
///
/// `RUST_LOG` overrides `level` when set. `LogFormat::Json` emits flattened
/// JSON events, `LogFormat::Text` a pretty human-readable layout.
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: LogLevel, format: LogFormat) -> Result<(), ConfigError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(level))
            .map_err(|e| ConfigError::Logging(e.to_string()))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_ansi(false),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().pretty().with_target(true))
            .try_init(),
    };

    result.map_err(|e| ConfigError::Logging(e.to_string()))
}
