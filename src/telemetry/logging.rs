//! Logging setup.
//!
//! The subscriber is configured from the `[log]` section; a `RUST_LOG`
//! environment variable overrides the configured level when present.

use serde::Deserialize;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Logging configuration from the `[log]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Installs the global subscriber. Safe to call when one is already
/// installed (embedders, tests); the existing subscriber wins.
pub fn init_logging(config: Option<&LogConfig>) {
    let (level, format) = match config {
        Some(cfg) => (cfg.level.as_str(), cfg.format.as_str()),
        None => ("info", "pretty"),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = match format {
        "json" => builder
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.try_init(),
    };
}

/// Maps a configured level name onto a filter directive. Unknown names
/// fall back to `info` rather than failing startup.
fn level_directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("debug"), "debug");
        assert_eq!(level_directive("WARN"), "warn");
        assert_eq!(level_directive("bogus"), "info");
        assert_eq!(level_directive(""), "info");
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }
}
