// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    EngineSettings, ExchangeSettings, MAX_EXCHANGE_TIMEOUT_MS, RawEngineSettings,
};
use crate::errors::{EngineError, Result};

impl TryFrom<RawEngineSettings> for EngineSettings {
    type Error = EngineError;

    fn try_from(raw: RawEngineSettings) -> std::result::Result<Self, Self::Error> {
        validate_exchange(&raw)?;
        Ok(EngineSettings {
            exchange: ExchangeSettings::new_unchecked(Duration::from_millis(
                raw.exchange.default_timeout_ms,
            )),
        })
    }
}

fn validate_exchange(raw: &RawEngineSettings) -> Result<()> {
    let timeout_ms = raw.exchange.default_timeout_ms;
    if timeout_ms == 0 {
        return Err(EngineError::Config(
            "[exchange].default_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if timeout_ms > MAX_EXCHANGE_TIMEOUT_MS {
        return Err(EngineError::Config(format!(
            "[exchange].default_timeout_ms must be <= {MAX_EXCHANGE_TIMEOUT_MS} (got {timeout_ms})"
        )));
    }
    Ok(())
}
