// src/engine/mod.rs

//! Rule engine.
//!
//! This module ties together:
//! - the resolver / initialiser ([`resolver`]) that makes a forest live for
//!   one run,
//! - the trigger index ([`index`]) of proactive / reactive / exception links,
//! - the run-order helpers ([`order`]),
//! - the two executors: [`sequential`] on the calling thread and
//!   [`concurrent`] on the tokio runtime.
//!
//! [`RuleEngine`] is the entry point: it owns the caller's definitions and
//! runs resolver, index and executor for every `execute*` call.

pub mod concurrent;
pub mod index;
pub mod order;
pub mod resolver;
pub mod sequential;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::EngineSettings;
use crate::errors::Result;
use crate::exchange::{ExchangeStore, RunId};
use crate::rule::context::Attachment;
use crate::rule::{RuleContext, RuleDefinition, RuleResult};

pub use concurrent::ConcurrentExecutor;
pub use index::{RuleRole, TriggerIndex};
pub use resolver::{RuleRegistry, RuleResolver};
pub use sequential::SequentialExecutor;

use resolver::{Bootstrap, Mode};

/// Per-run engine state shared by every rule of the run.
#[derive(Debug)]
pub struct RunScope {
    run_id: RunId,
    terminated: AtomicBool,
}

impl RunScope {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            terminated: AtomicBool::new(false),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Gate check: the run is not terminated and the rule's own
    /// configuration allows it.
    pub fn can_invoke(&self, rule: &RuleContext) -> bool {
        if self.is_terminated() {
            debug!(rule = %rule.kind(), run_id = %self.run_id, "run terminated; rule not invoked");
            return false;
        }
        let allowed = rule.configuration().can_invoke();
        if !allowed {
            debug!(rule = %rule.kind(), run_id = %self.run_id, "rule gated off");
        }
        allowed
    }

    /// Carry a rule's terminate request over to the run. Once set, it stays
    /// set for the rest of the run.
    pub fn absorb_terminate(&self, rule: &RuleContext) {
        if rule.configuration().requests_termination() && !self.terminated.swap(true, Ordering::AcqRel) {
            info!(rule = %rule.kind(), run_id = %self.run_id, "rule terminated the run");
        }
    }
}

/// Entry point: holds the caller's rule definitions and runs them.
pub struct RuleEngine {
    rules: Vec<RuleDefinition>,
    resolver: Option<Arc<dyn RuleResolver>>,
    exchange: Arc<ExchangeStore>,
    settings: EngineSettings,
}

impl fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.rules)
            .field("resolver", &self.resolver.is_some())
            .field("exchange", &self.exchange)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            resolver: None,
            exchange: Arc::new(ExchangeStore::new()),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: impl RuleResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Share an exchange store with other engines.
    pub fn with_exchange(mut self, exchange: Arc<ExchangeStore>) -> Self {
        self.exchange = exchange;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn exchange(&self) -> &Arc<ExchangeStore> {
        &self.exchange
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    pub fn add_rule(&mut self, definition: RuleDefinition) -> &mut Self {
        self.rules.push(definition);
        self
    }

    pub fn add_rules(&mut self, definitions: impl IntoIterator<Item = RuleDefinition>) -> &mut Self {
        self.rules.extend(definitions);
        self
    }

    fn attachment(&self, run_cancellation: Option<CancellationToken>) -> Attachment {
        Attachment {
            exchange: Arc::clone(&self.exchange),
            default_timeout: self.settings.exchange.default_timeout(),
            run_cancellation,
        }
    }

    /// Run every rule on the calling thread.
    ///
    /// Async rules are rejected with
    /// [`IncompatibleRule`](crate::errors::EngineError::IncompatibleRule).
    pub fn execute(&mut self) -> Result<Vec<RuleResult>> {
        if self.rules.is_empty() {
            return Ok(Vec::new());
        }

        let scope = RunScope::new(RunId::new());
        info!(run_id = %scope.run_id(), rules = self.rules.len(), "starting sequential run");

        let bootstrap = Bootstrap::new(
            self.resolver.as_deref(),
            scope.run_id(),
            self.attachment(None),
            Mode::Sequential,
        );
        let roots = bootstrap.resolve_sync(&mut self.rules)?;
        let index = TriggerIndex::build(&roots)?;

        let results = SequentialExecutor::new(&index, &scope).run(&roots)?;

        info!(run_id = %scope.run_id(), results = results.len(), "sequential run finished");
        Ok(results)
    }

    /// Run every rule on the tokio runtime with a cancellation handle owned
    /// by this call.
    pub async fn execute_async(&mut self) -> Result<Vec<RuleResult>> {
        self.execute_async_with(CancellationToken::new()).await
    }

    /// Like [`execute_async`](Self::execute_async). Parallel rules without
    /// a cancellation source of their own observe `cancellation`.
    pub async fn execute_async_with(&mut self, cancellation: CancellationToken) -> Result<Vec<RuleResult>> {
        if self.rules.is_empty() {
            return Ok(Vec::new());
        }

        let scope = RunScope::new(RunId::new());
        info!(run_id = %scope.run_id(), rules = self.rules.len(), "starting concurrent run");

        let attachment = self.attachment(Some(cancellation));
        let bootstrap = Bootstrap::new(
            self.resolver.as_deref(),
            scope.run_id(),
            attachment,
            Mode::Concurrent,
        );
        let roots = bootstrap.resolve_async(&mut self.rules).await?;
        let index = TriggerIndex::build(&roots)?;

        let run_id = scope.run_id();
        let results = Arc::new(ConcurrentExecutor::new(index, scope)).run(&roots).await?;

        info!(run_id = %run_id, results = results.len(), "concurrent run finished");
        Ok(results)
    }
}
