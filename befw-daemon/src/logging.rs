//! Logging initialization for befw-daemon.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `BefwConfig`. `RUST_LOG` takes precedence over the configured level.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use befw_core::config::GeneralConfig;

/// HTTP client internals are noisy at debug level.
const QUIET_TARGETS: &str = "hyper=warn,reqwest=warn,rustls=warn";

/// Builds the filter directive for `level`.
pub fn filter_directive(level: &str) -> String {
    format!("{level},{QUIET_TARGETS}")
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
///
/// # Formats
///
/// * `"json"` - JSON lines (default)
/// * `"pretty"` - Human-readable output for interactive runs
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.log_level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_keeps_level_first() {
        let directive = filter_directive("debug");
        assert!(directive.starts_with("debug,"));
        assert!(directive.contains("hyper=warn"));
        // 파싱 가능한 지시문이어야 함
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let config = GeneralConfig {
            log_format: "xml".to_owned(),
            ..Default::default()
        };
        let err = init_tracing(&config).unwrap_err();
        assert!(err.to_string().contains("unknown log format"));
    }
}
