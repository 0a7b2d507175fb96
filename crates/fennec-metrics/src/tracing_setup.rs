//! Tracing and logging setup.

use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Target used by the per-query log; it gets its own filter directive so the
/// query log can be switched off independently of the server log.
pub const QUERY_LOG_TARGET: &str = "fennec::query";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Server log level.
    pub level: Level,

    /// Log format.
    pub format: LogFormat,

    /// Whether the per-query log is emitted.
    pub query_log: bool,
}

/// Log format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text format.
    Text,

    /// JSON format.
    Json,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            query_log: true,
        }
    }
}

/// Parses a log level string, defaulting to INFO.
pub fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initializes the tracing subscriber.
///
/// Must be called once, before any component logs.
pub fn init_tracing(config: &LogConfig) {
    let mut filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    if config.query_log {
        // The query log always flows regardless of the server level.
        filter = filter.add_directive(
            format!("{}=info", QUERY_LOG_TARGET)
                .parse()
                .expect("static directive parses"),
        );
    } else {
        filter = filter.add_directive(
            format!("{}=off", QUERY_LOG_TARGET)
                .parse()
                .expect("static directive parses"),
        );
    }

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true))
                .init();
        }
    }
}
