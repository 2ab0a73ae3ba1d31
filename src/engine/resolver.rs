// src/engine/resolver.rs

//! Rule resolution and initialisation.
//!
//! Turns the caller's [`RuleDefinition`]s into live rules for one run:
//!
//! - type tokens are resolved through the injected [`RuleResolver`];
//! - every rule gets its model and a configuration stamped with the run id,
//!   with constraint and parallel-policy inheritance from its parent;
//! - setup hooks run, then nested definitions are attached below the
//!   freshly initialised parent.
//!
//! The synchronous path walks the forest depth-first on the calling thread.
//! The concurrent path launches every setup hook as its own task and only
//! returns once all of them have settled.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, trace};

use crate::errors::{EngineError, Result};
use crate::exchange::RunId;
use crate::rule::context::Attachment;
use crate::rule::{
    AsyncRule, Constraint, ParallelConfiguration, Rule, RuleBody, RuleDefinition, RuleInstance,
    RuleKind, RuleNode, RuleRef, RuleSlot, RuleToken,
};

/// Turns a type token into a rule instance.
///
/// Any `Fn(&RuleToken) -> Option<RuleInstance>` closure is a resolver.
pub trait RuleResolver: Send + Sync {
    fn resolve(&self, token: &RuleToken) -> Option<RuleInstance>;
}

impl<F> RuleResolver for F
where
    F: Fn(&RuleToken) -> Option<RuleInstance> + Send + Sync,
{
    fn resolve(&self, token: &RuleToken) -> Option<RuleInstance> {
        self(token)
    }
}

type Factory = Box<dyn Fn() -> RuleInstance + Send + Sync>;

/// Type-keyed table of rule factories.
#[derive(Default)]
pub struct RuleRegistry {
    factories: HashMap<RuleKind, Factory>,
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R: Rule + Default>(&mut self) -> &mut Self {
        self.register_with::<R>(|| RuleInstance::new(R::default()))
    }

    pub fn register_async<R: AsyncRule + Default>(&mut self) -> &mut Self {
        self.register_with::<R>(|| RuleInstance::new_async(R::default()))
    }

    /// Register a factory for tokens of type `R`.
    pub fn register_with<R: 'static>(
        &mut self,
        factory: impl Fn() -> RuleInstance + Send + Sync + 'static,
    ) -> &mut Self {
        self.factories.insert(RuleKind::of::<R>(), Box::new(factory));
        self
    }

    pub fn contains(&self, token: &RuleToken) -> bool {
        self.factories.contains_key(&token.kind())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl RuleResolver for RuleRegistry {
    fn resolve(&self, token: &RuleToken) -> Option<RuleInstance> {
        self.factories.get(&token.kind()).map(|factory| factory())
    }
}

/// Which executor the forest is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Sequential,
    Concurrent,
}

impl Mode {
    fn executor(self) -> &'static str {
        match self {
            Mode::Sequential => "sequential",
            Mode::Concurrent => "concurrent",
        }
    }
}

/// What a child inherits from the rule it is nested under, captured after
/// the parent's setup hook ran.
struct ParentSnapshot {
    constraint: Option<Constraint>,
    inherit_constraint: bool,
    is_async: bool,
    parallel: ParallelConfiguration,
}

impl ParentSnapshot {
    fn of(parent: &RuleNode) -> Self {
        let configuration = parent.configuration();
        Self {
            constraint: configuration.constraint,
            inherit_constraint: configuration.nested_rules_inherit_constraint,
            is_async: parent.is_async(),
            parallel: parent.parallel_configuration(),
        }
    }
}

pub(crate) struct Bootstrap<'a> {
    resolver: Option<&'a dyn RuleResolver>,
    run_id: RunId,
    attachment: Attachment,
    mode: Mode,
}

impl<'a> Bootstrap<'a> {
    pub(crate) fn new(
        resolver: Option<&'a dyn RuleResolver>,
        run_id: RunId,
        attachment: Attachment,
        mode: Mode,
    ) -> Self {
        Self {
            resolver,
            run_id,
            attachment,
            mode,
        }
    }

    /// Resolve and initialise the forest on the calling thread.
    pub(crate) fn resolve_sync(&self, definitions: &mut [RuleDefinition]) -> Result<Vec<RuleRef>> {
        let mut roots = Vec::with_capacity(definitions.len());

        for definition in definitions.iter_mut() {
            let root = self.attach(definition, None)?;
            roots.push(root.clone());

            let mut pending = vec![root];
            while let Some(rule) = pending.pop() {
                initialize_sync(&rule)?;
                let children = self.attach_nested(&rule)?;
                pending.extend(children.into_iter().rev());
            }
        }

        Ok(roots)
    }

    /// Resolve the forest and run every setup hook as its own task.
    ///
    /// All tasks are drained even after a failure; the first failure is
    /// returned.
    pub(crate) async fn resolve_async(&self, definitions: &mut [RuleDefinition]) -> Result<Vec<RuleRef>> {
        let roots = definitions
            .iter_mut()
            .map(|definition| self.attach(definition, None))
            .collect::<Result<Vec<_>>>()?;

        let mut setups = JoinSet::new();
        for root in &roots {
            setups.spawn(initialize_async(root.clone()));
        }

        let mut first_error: Option<EngineError> = None;
        while let Some(joined) = setups.join_next().await {
            let outcome = joined
                .map_err(|err| EngineError::TaskFailed(err.to_string()))
                .and_then(|outcome| outcome);

            match outcome {
                Ok(rule) if first_error.is_none() => match self.attach_nested(&rule) {
                    Ok(children) => {
                        for child in children {
                            setups.spawn(initialize_async(child));
                        }
                    }
                    Err(err) => {
                        first_error = Some(err);
                    }
                },
                Ok(_) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(roots),
        }
    }

    /// Attach every nested definition of `parent`, in declaration order.
    fn attach_nested(&self, parent: &RuleNode) -> Result<Vec<RuleRef>> {
        let mut nested = parent.with_state(|state| mem::take(&mut state.nested));
        if nested.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = ParentSnapshot::of(parent);
        let attached = nested
            .iter_mut()
            .map(|definition| self.attach(definition, Some(&snapshot)))
            .collect::<Result<Vec<_>>>();

        parent.with_state(|state| {
            let added_meanwhile = mem::replace(&mut state.nested, nested);
            state.nested.extend(added_meanwhile);
        });

        attached
    }

    /// Make `definition` live and stamp it for this run.
    fn attach(&self, definition: &mut RuleDefinition, parent: Option<&ParentSnapshot>) -> Result<RuleRef> {
        let placeholder = RuleSlot::Token(RuleToken::from(definition.kind()));
        let rule = match mem::replace(&mut definition.slot, placeholder) {
            RuleSlot::Live(rule) => rule,
            RuleSlot::Instance(instance) => self.wrap(definition, instance),
            RuleSlot::Token(token) => {
                let instance = self.resolve_token(&token)?;
                self.wrap(definition, instance)
            }
        };
        definition.slot = RuleSlot::Live(rule.clone());

        if self.mode == Mode::Sequential && rule.is_async() {
            error!(rule = %rule.kind(), "async rule submitted to the sequential executor");
            return Err(EngineError::IncompatibleRule {
                rule: rule.name().to_string(),
                executor: self.mode.executor(),
            });
        }

        let is_async = rule.is_async();
        let run_id = self.run_id;
        rule.with_state(|state| {
            state.model = definition.model.clone();
            state.configuration = state.configuration.stamped(run_id);
            state.unhandled = None;
            state.attachment = Some(self.attachment.clone());

            let Some(parent) = parent else {
                return;
            };
            if parent.inherit_constraint {
                state.configuration.constraint = parent.constraint.clone();
                state.configuration.nested_rules_inherit_constraint = true;
            }
            if state.parallel
                && is_async
                && parent.is_async
                && parent.parallel.nested_parallel_rules_inherit
            {
                state.parallel_configuration = parent.parallel.inherited_by(&state.parallel_configuration);
            }
        });

        trace!(rule = %rule.kind(), run_id = %run_id, nested = parent.is_some(), "rule attached");
        Ok(rule)
    }

    fn wrap(&self, definition: &RuleDefinition, instance: RuleInstance) -> RuleRef {
        let rule = RuleNode::wrap(instance);
        definition.apply_overrides(&rule);
        rule
    }

    fn resolve_token(&self, token: &RuleToken) -> Result<RuleInstance> {
        let instance = self.resolver.and_then(|resolver| resolver.resolve(token));
        match instance {
            Some(instance) => {
                debug!(token = %token.kind(), resolved = %instance.kind(), "rule token resolved");
                Ok(instance)
            }
            None => {
                error!(token = %token.kind(), "unable to resolve rule token");
                Err(EngineError::UnresolvedRule(token.name().to_string()))
            }
        }
    }
}

fn setup_failed(rule: &RuleNode, error: anyhow::Error) -> EngineError {
    error!(rule = %rule.kind(), error = %format!("{error:#}"), "rule setup failed");
    EngineError::SetupFailed {
        rule: rule.name().to_string(),
        error: Arc::new(error),
    }
}

fn initialize_sync(rule: &RuleNode) -> Result<()> {
    let mut body = rule
        .body()
        .try_lock()
        .map_err(|_| EngineError::RuleBusy(rule.name().to_string()))?;

    match &mut *body {
        RuleBody::Sync(body) => body
            .initialize(rule.context())
            .map_err(|error| setup_failed(rule, error)),
        RuleBody::Async(_) => Err(EngineError::IncompatibleRule {
            rule: rule.name().to_string(),
            executor: Mode::Sequential.executor(),
        }),
    }
}

async fn initialize_async(rule: RuleRef) -> Result<RuleRef> {
    let outcome = {
        let mut body = rule.body().lock().await;
        body.initialize(rule.context()).await
    };
    outcome.map_err(|error| setup_failed(&rule, error))?;
    Ok(rule)
}
