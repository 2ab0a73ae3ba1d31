// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

/// Default exchange read timeout, in milliseconds.
pub const DEFAULT_EXCHANGE_TIMEOUT_MS: u64 = 15_000;

/// Largest accepted `[exchange].default_timeout_ms`: one day.
pub const MAX_EXCHANGE_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;

/// Settings as read from a TOML file, before validation.
///
/// ```toml
/// [exchange]
/// default_timeout_ms = 15000
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEngineSettings {
    #[serde(default)]
    pub exchange: RawExchangeSettings,
}

/// `[exchange]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawExchangeSettings {
    /// Timeout for `RuleContext::try_get_value` and its async form when
    /// no explicit timeout is given.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_EXCHANGE_TIMEOUT_MS
}

impl Default for RawExchangeSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

/// Validated engine settings.
///
/// Obtain one through `TryFrom<RawEngineSettings>` (see `validate.rs`) or
/// [`EngineSettings::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub exchange: ExchangeSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeSettings {
    default_timeout: Duration,
}

impl ExchangeSettings {
    pub(crate) fn new_unchecked(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self::new_unchecked(Duration::from_millis(DEFAULT_EXCHANGE_TIMEOUT_MS))
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            exchange: ExchangeSettings::default(),
        }
    }
}
