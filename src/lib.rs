// src/lib.rs

//! In-process rule engine.
//!
//! A caller hands a [`RuleEngine`](engine::RuleEngine) a forest of rules,
//! each bound to a model. The engine resolves and initialises the rules,
//! wires proactive / reactive / exception links between them, runs them in
//! order (sequentially, or on tokio with parallel rules as tasks) and
//! returns the aggregated [`RuleResult`](rule::RuleResult)s.

pub mod cli;
pub mod config;
pub mod demo;
pub mod engine;
pub mod errors;
pub mod exchange;
pub mod logging;
pub mod rule;

use std::path::Path;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{EngineSettings, default_config_path, load_and_validate};
use crate::engine::RuleEngine;
use crate::rule::{RuleDefinition, RuleResult};

pub use crate::engine::{RuleRegistry, RuleResolver};
pub use crate::errors::{EngineError, Result as EngineResult};
pub use crate::exchange::{ExchangeStore, RunId};

/// High-level entry point used by `main.rs`.
///
/// Loads settings, builds the demo forest and runs it through the selected
/// executor.
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = load_settings(args.config.as_deref())?;
    let order = demo::sample_order();
    let forest = demo::forest(&order, args.concurrent);

    if args.dry_run {
        print_dry_run(&settings, &forest, args.concurrent);
        return Ok(());
    }

    let mut engine = RuleEngine::new()
        .with_settings(settings)
        .with_resolver(demo::registry());
    engine.add_rules(forest);

    info!(order = order.id, concurrent = args.concurrent, "running demo forest");
    let results = if args.concurrent {
        engine.execute_async().await?
    } else {
        engine.execute()?
    };

    print_results(&results);
    Ok(())
}

/// Explicit path, else `Rulekit.toml` if present, else defaults.
fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    match path {
        Some(path) => Ok(load_and_validate(path)?),
        None => {
            let fallback = default_config_path();
            if fallback.is_file() {
                debug!(path = %fallback.display(), "using default settings file");
                Ok(load_and_validate(&fallback)?)
            } else {
                Ok(EngineSettings::default())
            }
        }
    }
}

fn print_results(results: &[RuleResult]) {
    println!("results ({}):", results.len());
    for result in results {
        let name = result.name().unwrap_or("<unnamed>");
        let output = result.output::<String>().map(String::as_str).unwrap_or("-");
        match &result.error {
            Some(error) => println!("  - {name}: {output} [error: {error}]"),
            None => println!("  - {name}: {output}"),
        }
    }
}

fn print_dry_run(settings: &EngineSettings, forest: &[RuleDefinition], concurrent: bool) {
    println!("rulekit dry-run");
    println!(
        "  executor = {}",
        if concurrent { "concurrent" } else { "sequential" }
    );
    println!(
        "  exchange.default_timeout = {:?}",
        settings.exchange.default_timeout()
    );
    println!();

    println!("rules ({}):", forest.len());
    for definition in forest {
        println!("  - {}", definition.name());
    }

    debug!("dry-run complete (no execution)");
}
