// src/errors.rs

//! Crate-wide error type.
//!
//! Rule bodies report failures as `anyhow::Error`; the engine wraps those
//! (shared behind an `Arc`, so every handler sees the same instance) into
//! the structured [`EngineError`] variants below when they become fatal.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unable to resolve rule '{0}'")]
    UnresolvedRule(String),

    #[error("found {0} global exception handlers; only one can be defined")]
    GlobalHandler(usize),

    #[error("unable to get '{key}' within {timeout:?}")]
    ExchangeTimeout { key: String, timeout: Duration },

    #[error("rule '{0}' has no model")]
    ModelMissing(String),

    #[error("model of rule '{rule}' is not a {expected}")]
    ModelMismatch { rule: String, expected: &'static str },

    #[error("rule '{0}' is flagged as a trigger but observes no rule")]
    UnobservedTrigger(String),

    #[error("rule '{rule}' cannot run on the {executor} executor")]
    IncompatibleRule {
        rule: String,
        executor: &'static str,
    },

    #[error("rule '{0}' was re-entered while its hooks were running")]
    RuleBusy(String),

    #[error("rule '{0}' is not attached to a run")]
    Detached(String),

    #[error("setup of rule '{rule}' failed: {error:#}")]
    SetupFailed {
        rule: String,
        error: Arc<anyhow::Error>,
    },

    #[error("rule '{rule}' failed and no handler is registered: {error:#}")]
    Unhandled {
        rule: String,
        error: Arc<anyhow::Error>,
    },

    #[error("exception handler '{rule}' failed: {error:#}")]
    HandlerFailed {
        rule: String,
        error: Arc<anyhow::Error>,
    },

    #[error("parallel task did not complete: {0}")]
    TaskFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// The failure a rule body raised, for the variants that carry one.
    pub fn rule_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            EngineError::SetupFailed { error, .. }
            | EngineError::Unhandled { error, .. }
            | EngineError::HandlerFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
