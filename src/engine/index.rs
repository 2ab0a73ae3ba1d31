// src/engine/index.rs

//! Trigger index.
//!
//! Partitions the resolved forest into proactive / reactive / exception
//! links keyed by the rule type they observe, and locates the run's single
//! global exception handler. Built once per run, after setup, by one
//! pre-order walk over the whole tree.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::errors::{EngineError, Result};
use crate::rule::{RuleContext, RuleKind, RuleNode, RuleRef};

/// Execution role of a rule, derived from its flags.
///
/// A rule with several flags set gets the first of: global handler,
/// proactive, reactive, exception handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleRole {
    None,
    Proactive,
    Reactive,
    ExceptionHandler,
    GlobalHandler,
}

impl RuleRole {
    pub fn of(rule: &RuleContext) -> Self {
        if rule.is_global_exception_handler() {
            RuleRole::GlobalHandler
        } else if rule.is_proactive() {
            RuleRole::Proactive
        } else if rule.is_reactive() {
            RuleRole::Reactive
        } else if rule.is_exception_handler() {
            RuleRole::ExceptionHandler
        } else {
            RuleRole::None
        }
    }
}

/// How a failure is treated by the pass that observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routing {
    /// Route to exception handlers, else the global handler, else fail.
    Route,
    /// The failing rule is itself a handler; its failure is fatal.
    Fatal,
}

type Links = HashMap<RuleKind, Vec<RuleRef>>;

#[derive(Debug, Default)]
pub struct TriggerIndex {
    proactive: Links,
    reactive: Links,
    exception: Links,
    global: Option<RuleRef>,
    roles: HashMap<usize, RuleRole>,
}

fn node_key(rule: &RuleRef) -> usize {
    Arc::as_ptr(rule) as usize
}

impl TriggerIndex {
    /// Index `roots` and every rule nested below them.
    pub fn build(roots: &[RuleRef]) -> Result<Self> {
        let mut index = TriggerIndex::default();
        let mut globals: Vec<RuleRef> = Vec::new();

        let mut pending: Vec<RuleRef> = roots.iter().rev().cloned().collect();
        while let Some(rule) = pending.pop() {
            let role = RuleRole::of(&rule);
            index.roles.insert(node_key(&rule), role);

            if rule.is_global_exception_handler() {
                globals.push(rule.clone());
            }
            if rule.is_proactive() {
                let observed = observed_kind(&rule)?;
                index.proactive.entry(observed).or_default().push(rule.clone());
            }
            if rule.is_reactive() {
                let observed = observed_kind(&rule)?;
                index.reactive.entry(observed).or_default().push(rule.clone());
            }
            if rule.is_exception_handler() {
                match rule.observed() {
                    Some(observed) => index.exception.entry(observed).or_default().push(rule.clone()),
                    // A global handler may also carry the exception flag.
                    None if rule.is_global_exception_handler() => {}
                    None => return Err(unobserved(&rule)),
                }
            }

            pending.extend(rule.nested_rules().into_iter().rev());
        }

        if globals.len() > 1 {
            let names: Vec<_> = globals.iter().map(|rule| rule.name()).collect();
            error!(count = globals.len(), ?names, "more than one global exception handler");
            return Err(EngineError::GlobalHandler(globals.len()));
        }
        index.global = globals.pop();

        debug!(
            proactive = index.proactive.len(),
            reactive = index.reactive.len(),
            exception = index.exception.len(),
            global = index.global.is_some(),
            "trigger index built"
        );
        Ok(index)
    }

    pub fn proactive_for(&self, kind: RuleKind) -> &[RuleRef] {
        self.proactive.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn reactive_for(&self, kind: RuleKind) -> &[RuleRef] {
        self.reactive.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn exception_handlers_for(&self, kind: RuleKind) -> &[RuleRef] {
        self.exception.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn global_handler(&self) -> Option<&RuleRef> {
        self.global.as_ref()
    }

    /// Role computed for `rule` at build time; `None` for rules that were
    /// not part of the indexed forest.
    pub fn role_of(&self, rule: &RuleRef) -> Option<RuleRole> {
        self.roles.get(&node_key(rule)).copied()
    }

    /// Record `error` as `rule`'s unhandled failure and pick the rules that
    /// handle it, handing each the same error instance.
    ///
    /// Fails with the fatal error when nobody may handle it.
    pub(crate) fn route_failure(
        &self,
        rule: &RuleNode,
        error: anyhow::Error,
        routing: Routing,
    ) -> Result<&[RuleRef]> {
        let error = Arc::new(error);
        rule.set_unhandled(Arc::clone(&error));

        if routing == Routing::Fatal {
            error!(rule = %rule.kind(), error = %format!("{error:#}"), "exception handler failed");
            return Err(EngineError::HandlerFailed {
                rule: rule.name().to_string(),
                error,
            });
        }

        let handlers = self.exception_handlers_for(rule.kind());
        let handlers = if !handlers.is_empty() {
            warn!(
                rule = %rule.kind(),
                handlers = handlers.len(),
                error = %format!("{error:#}"),
                "rule failed; routing to exception handlers"
            );
            handlers
        } else if let Some(global) = &self.global {
            warn!(
                rule = %rule.kind(),
                handler = %global.kind(),
                error = %format!("{error:#}"),
                "rule failed; routing to global exception handler"
            );
            std::slice::from_ref(global)
        } else {
            error!(rule = %rule.kind(), error = %format!("{error:#}"), "unhandled rule failure");
            return Err(EngineError::Unhandled {
                rule: rule.name().to_string(),
                error,
            });
        };

        for handler in handlers {
            handler.set_unhandled(Arc::clone(&error));
        }
        Ok(handlers)
    }
}

fn observed_kind(rule: &RuleRef) -> Result<RuleKind> {
    rule.observed().ok_or_else(|| unobserved(rule))
}

fn unobserved(rule: &RuleRef) -> EngineError {
    error!(rule = %rule.kind(), "trigger rule observes no rule");
    EngineError::UnobservedTrigger(rule.name().to_string())
}
