// src/logging.rs

//! Logging setup for `vertexsync` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `VERTEXSYNC_LOG` environment variable, as `EnvFilter` directives
//!    (e.g. "debug", "vertexsync=debug,vertexsync::db=trace")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout carries only the printed class
//! mapping.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "VERTEXSYNC_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, env_value.as_deref());

    // Send logs to stderr; keep stdout free for the mapping.
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Pick the filter from the CLI level, then the env directives, then `info`.
///
/// Env directives that fail to parse are reported on stderr and ignored.
pub fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(lvl) = cli_level {
        return EnvFilter::new(directive_for(lvl));
    }

    match env_value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|err| {
            // No subscriber is installed yet.
            eprintln!("ignoring invalid {LOG_ENV} value {directives:?}: {err}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}

fn directive_for(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_wins_over_env() {
        let filter = build_filter(Some(LogLevel::Trace), Some("vertexsync=warn"));
        assert_eq!(filter.to_string(), "trace");
    }

    #[test]
    fn env_directives_keep_their_targets() {
        let filter = build_filter(None, Some(" vertexsync=debug "));
        assert_eq!(filter.to_string(), "vertexsync=debug");
    }

    #[test]
    fn env_plain_level_is_accepted() {
        assert_eq!(build_filter(None, Some("warn")).to_string(), "warn");
    }

    #[test]
    fn invalid_or_missing_env_falls_back_to_info() {
        assert_eq!(build_filter(None, Some("vertexsync=loud")).to_string(), "info");
        assert_eq!(build_filter(None, Some("  ")).to_string(), "info");
        assert_eq!(build_filter(None, None).to_string(), "info");
    }
}
