// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `rulekit`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rulekit",
    version,
    about = "Run the built-in order-validation rule forest through the rule engine.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to an engine settings file (TOML).
    ///
    /// When omitted, `Rulekit.toml` in the current directory is used if it
    /// exists; otherwise built-in defaults apply.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Use the asynchronous executor (parallel rules run as tasks).
    #[arg(long)]
    pub concurrent: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RULEKIT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the rule forest and settings, but don't execute any rule.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse() {
        let args = CliArgs::try_parse_from([
            "rulekit",
            "--concurrent",
            "--log-level",
            "debug",
            "--config",
            "settings.toml",
        ])
        .unwrap();

        assert!(args.concurrent);
        assert!(!args.dry_run);
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert_eq!(args.config, Some(PathBuf::from("settings.toml")));
    }
}
