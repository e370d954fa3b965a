use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used when neither the flag, the environment nor the config file set one
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Pick the filter directive. Precedence: `--log-level`, then `RUST_LOG`,
/// then `LOG_LEVEL`, then the config file's `log_level`.
pub fn filter_directive(
    cli_level: Option<&str>,
    rust_log: Option<&str>,
    env_level: Option<&str>,
    config_level: Option<&str>,
) -> String {
    [cli_level, rust_log, env_level, config_level]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LOG_LEVEL)
        .to_string()
}

/// Install the global subscriber. Call after `.env` has been loaded so
/// `RUST_LOG` and `LOG_LEVEL` from it take effect.
pub fn init_tracing(cli_level: Option<&str>, config_level: Option<&str>) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let env_level = std::env::var("LOG_LEVEL").ok();
    let directive = filter_directive(
        cli_level,
        rust_log.as_deref(),
        env_level.as_deref(),
        config_level,
    );

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}' ({}), falling back to '{}'", directive, e, DEFAULT_LOG_LEVEL);
        EnvFilter::new(DEFAULT_LOG_LEVEL)
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_everything() {
        assert_eq!(
            filter_directive(Some("trace"), Some("info"), Some("debug"), Some("error")),
            "trace"
        );
    }

    #[test]
    fn test_log_level_env_used_without_rust_log() {
        assert_eq!(filter_directive(None, None, Some("debug"), Some("error")), "debug");
        assert_eq!(
            filter_directive(None, Some("reachy_orchestrator=trace"), Some("debug"), None),
            "reachy_orchestrator=trace"
        );
    }

    #[test]
    fn test_blank_values_skipped_then_default() {
        assert_eq!(filter_directive(None, Some("  "), None, Some("info")), "info");
        assert_eq!(filter_directive(None, None, None, None), DEFAULT_LOG_LEVEL);
    }
}
