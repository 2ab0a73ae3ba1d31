// src/logging.rs

//! Logging setup for `rulekit` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `RULEKIT_LOG` environment variable: a level ("debug") or a full
//!    filter directive ("rulekit::engine=trace,info")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout only carries rule results.

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no CLI level is given.
pub const LOG_ENV: &str = "RULEKIT_LOG";

/// Initialise the global logging subscriber.
///
/// Call once at startup; a second call fails.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = filter_for(cli_level, std::env::var(LOG_ENV).ok())?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("failed to install the logging subscriber")?;

    Ok(())
}

fn filter_for(cli_level: Option<LogLevel>, env: Option<String>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(level.as_str()));
    }

    match env.as_deref().map(str::trim) {
        Some(directive) if !directive.is_empty() => {
            let directive = normalise_level(directive).unwrap_or(directive);
            EnvFilter::try_new(directive).with_context(|| format!("invalid {LOG_ENV} value '{directive}'"))
        }
        _ => Ok(EnvFilter::new("info")),
    }
}

/// Accept a few spellings of plain levels.
fn normalise_level(s: &str) -> Option<&'static str> {
    match s.to_lowercase().as_str() {
        "error" => Some("error"),
        "warn" | "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        "trace" => Some("trace"),
        _ => None,
    }
}
