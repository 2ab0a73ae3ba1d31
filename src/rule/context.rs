// src/rule/context.rs

//! Engine-owned state of a single rule.
//!
//! Every hook receives a `&RuleContext`. All accessors lock internally for
//! the duration of the call only, so hooks may freely call them (also
//! across `.await` points) without holding anything.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::{EngineError, Result};
use crate::exchange::{ExchangeStore, RunId};

use super::{
    Configuration, Model, ParallelConfiguration, Payload, RuleDefinition, RuleKind, RuleRef,
};

/// Where a rule is attached once the resolver has stamped it for a run.
#[derive(Clone)]
pub(crate) struct Attachment {
    pub(crate) exchange: Arc<ExchangeStore>,
    pub(crate) default_timeout: Duration,
    pub(crate) run_cancellation: Option<CancellationToken>,
}

#[derive(Default)]
pub(crate) struct RuleState {
    pub(crate) proactive: bool,
    pub(crate) reactive: bool,
    pub(crate) exception_handler: bool,
    pub(crate) global_exception_handler: bool,
    pub(crate) parallel: bool,
    pub(crate) observed: Option<RuleKind>,
    pub(crate) configuration: Configuration,
    pub(crate) parallel_configuration: ParallelConfiguration,
    pub(crate) model: Option<Model>,
    pub(crate) nested: Vec<RuleDefinition>,
    pub(crate) unhandled: Option<Arc<anyhow::Error>>,
    pub(crate) attachment: Option<Attachment>,
}

pub struct RuleContext {
    kind: RuleKind,
    is_async: bool,
    state: Mutex<RuleState>,
}

impl fmt::Debug for RuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RuleContext")
            .field("kind", &self.kind)
            .field("async", &self.is_async)
            .field("observed", &state.observed)
            .field("configuration", &state.configuration)
            .field("nested", &state.nested.len())
            .finish_non_exhaustive()
    }
}

impl RuleContext {
    pub(crate) fn new(kind: RuleKind, is_async: bool) -> Self {
        Self {
            kind,
            is_async,
            state: Mutex::new(RuleState::default()),
        }
    }

    pub(crate) fn with_state<T>(&self, f: impl FnOnce(&mut RuleState) -> T) -> T {
        f(&mut self.state.lock())
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    // --- role flags -------------------------------------------------------

    pub fn set_proactive(&self, value: bool) {
        self.state.lock().proactive = value;
    }

    pub fn set_reactive(&self, value: bool) {
        self.state.lock().reactive = value;
    }

    pub fn set_exception_handler(&self, value: bool) {
        self.state.lock().exception_handler = value;
    }

    pub fn set_global_exception_handler(&self, value: bool) {
        self.state.lock().global_exception_handler = value;
    }

    pub fn set_parallel(&self, value: bool) {
        self.state.lock().parallel = value;
    }

    pub fn is_proactive(&self) -> bool {
        self.state.lock().proactive
    }

    pub fn is_reactive(&self) -> bool {
        self.state.lock().reactive
    }

    pub fn is_exception_handler(&self) -> bool {
        self.state.lock().exception_handler
    }

    pub fn is_global_exception_handler(&self) -> bool {
        self.state.lock().global_exception_handler
    }

    pub fn is_parallel(&self) -> bool {
        self.state.lock().parallel
    }

    /// Eligible for normal scheduling: none of the trigger roles is set.
    pub fn is_plain(&self) -> bool {
        let state = self.state.lock();
        !(state.reactive || state.proactive || state.exception_handler || state.global_exception_handler)
    }

    /// Declare the rule type this one reacts to, guards, or handles
    /// failures for. Set at most once; a conflicting second call is
    /// ignored and returns `false`.
    pub fn observe<R: 'static>(&self) -> bool {
        self.observe_kind(RuleKind::of::<R>())
    }

    pub fn observe_kind(&self, kind: RuleKind) -> bool {
        let mut state = self.state.lock();
        match state.observed {
            None => {
                state.observed = Some(kind);
                true
            }
            Some(existing) if existing == kind => true,
            Some(existing) => {
                warn!(
                    rule = %self.kind,
                    observed = %existing,
                    requested = %kind,
                    "observed rule already set; ignoring"
                );
                false
            }
        }
    }

    pub fn observed(&self) -> Option<RuleKind> {
        self.state.lock().observed
    }

    // --- configuration ----------------------------------------------------

    pub fn configuration(&self) -> Configuration {
        self.state.lock().configuration.clone()
    }

    /// Edit the configuration in place. The run id cannot be changed.
    pub fn configure(&self, f: impl FnOnce(&mut Configuration)) {
        let mut state = self.state.lock();
        let run_id = state.configuration.run_id;
        f(&mut state.configuration);
        state.configuration.run_id = run_id;
    }

    pub fn parallel_configuration(&self) -> ParallelConfiguration {
        self.state.lock().parallel_configuration.clone()
    }

    pub fn configure_parallel(&self, f: impl FnOnce(&mut ParallelConfiguration)) {
        f(&mut self.state.lock().parallel_configuration);
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.state.lock().configuration.run_id()
    }

    /// Cancellation source this rule observes when dispatched in parallel:
    /// its own, else the one the run was started with.
    pub fn cancellation(&self) -> Option<CancellationToken> {
        let state = self.state.lock();
        state.parallel_configuration.cancellation.clone().or_else(|| {
            state
                .attachment
                .as_ref()
                .and_then(|attachment| attachment.run_cancellation.clone())
        })
    }

    // --- model ------------------------------------------------------------

    pub fn raw_model(&self) -> Option<Model> {
        self.state.lock().model.clone()
    }

    /// Typed model access.
    pub fn model<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let model = self
            .raw_model()
            .ok_or_else(|| EngineError::ModelMissing(self.name().to_string()))?;
        model.downcast::<T>().map_err(|_| EngineError::ModelMismatch {
            rule: self.name().to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    // --- nested rules -----------------------------------------------------

    /// Enqueue a nested rule definition owned by this rule.
    pub fn add_rule(&self, definition: RuleDefinition) {
        self.state.lock().nested.push(definition);
    }

    /// Whether this rule has nested rules of its own.
    pub fn is_nested(&self) -> bool {
        !self.state.lock().nested.is_empty()
    }

    /// Live nested rules, in declaration order. Unresolved definitions are
    /// not included.
    pub(crate) fn nested_rules(&self) -> Vec<RuleRef> {
        self.state
            .lock()
            .nested
            .iter()
            .filter_map(|definition| definition.live().cloned())
            .collect()
    }

    // --- failures ---------------------------------------------------------

    /// The failure this rule raised, or (for exception handlers) the
    /// failure of the rule being handled.
    pub fn unhandled_error(&self) -> Option<Arc<anyhow::Error>> {
        self.state.lock().unhandled.clone()
    }

    pub(crate) fn set_unhandled(&self, error: Arc<anyhow::Error>) {
        self.state.lock().unhandled = Some(error);
    }

    // --- exchange ---------------------------------------------------------

    fn exchange_handle(&self) -> Result<(Arc<ExchangeStore>, RunId, Duration)> {
        let state = self.state.lock();
        match (&state.attachment, state.configuration.run_id()) {
            (Some(attachment), Some(run_id)) => Ok((
                Arc::clone(&attachment.exchange),
                run_id,
                attachment.default_timeout,
            )),
            _ => Err(EngineError::Detached(self.name().to_string())),
        }
    }

    /// Publish a value for other rules of the same run.
    pub fn try_add(&self, key: impl Into<String>, value: impl Any + Send + Sync) -> Result<()> {
        self.try_add_payload(key, Arc::new(value))
    }

    pub fn try_add_payload(&self, key: impl Into<String>, value: Payload) -> Result<()> {
        let (store, run_id, _) = self.exchange_handle()?;
        store.put(run_id, key, value);
        Ok(())
    }

    /// Blocking read with the configured default timeout.
    pub fn try_get_value(&self, key: &str) -> Result<Payload> {
        let (store, run_id, timeout) = self.exchange_handle()?;
        store.get(run_id, key, timeout)
    }

    pub fn try_get_value_with_timeout(&self, key: &str, timeout: Duration) -> Result<Payload> {
        let (store, run_id, _) = self.exchange_handle()?;
        store.get(run_id, key, timeout)
    }

    pub async fn try_get_value_async(&self, key: &str) -> Result<Payload> {
        let (store, run_id, timeout) = self.exchange_handle()?;
        store.get_async(run_id, key, timeout).await
    }

    pub async fn try_get_value_async_with_timeout(&self, key: &str, timeout: Duration) -> Result<Payload> {
        let (store, run_id, _) = self.exchange_handle()?;
        store.get_async(run_id, key, timeout).await
    }
}
