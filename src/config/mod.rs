// src/config/mod.rs

//! Engine settings.
//!
//! Responsibilities:
//! - Define the TOML-backed settings model (`model.rs`).
//! - Load a settings file from disk (`loader.rs`).
//! - Validate the raw settings into their checked form (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    DEFAULT_EXCHANGE_TIMEOUT_MS, EngineSettings, ExchangeSettings, MAX_EXCHANGE_TIMEOUT_MS,
    RawEngineSettings, RawExchangeSettings,
};
