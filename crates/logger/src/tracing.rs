use std::{env::var, str::FromStr};

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}` (expected `compact` or `json`)")),
        }
    }
}

/// Options resolved from the service configuration.
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { level: LevelFilter::INFO, format: LogFormat::Compact }
    }
}

impl LogOptions {
    /// Build options from the textual level and format found in a config file.
    /// Unknown values fall back to the defaults.
    pub fn from_settings(level: &str, format: &str) -> Self {
        let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
        let format = format.parse::<LogFormat>().unwrap_or_default();
        Self { level, format }
    }
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` overrides the configured level and `RUST_LOG_FORMAT` overrides
/// the configured format. Calling this twice is harmless.
pub fn init_tracing(options: &LogOptions) {
    let env_filter =
        EnvFilter::builder().with_default_directive(options.level.into()).from_env_lossy();

    let format = match var("RUST_LOG_FORMAT") {
        Ok(raw) => raw.parse::<LogFormat>().unwrap_or_else(|error| {
            warn!("Ignoring RUST_LOG_FORMAT: {error}");
            options.format
        }),
        Err(_) => options.format,
    };

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    let _ = tracing_subscriber::registry().with(log_layer).try_init();
}
