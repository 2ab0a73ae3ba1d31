// src/engine/sequential.rs

//! Synchronous executor.
//!
//! Per rule, in run order:
//!
//! 1. nested-first rules run their unconditional children;
//! 2. the gate is checked (run not terminated, not skipped, constraint);
//! 3. if it passes: conditional pre-children, proactive links, the hooks,
//!    result recording, terminate propagation, reactive links and the
//!    conditional post-children;
//! 4. the unconditional post-children run whatever the gate said.
//!
//! A failing hook is routed to the rule's exception handlers, else to the
//! global handler, else it aborts the run.

use tracing::debug;

use crate::errors::{EngineError, Result};
use crate::rule::{Rule, RuleBody, RuleContext, RuleRef, RuleResult};

use super::RunScope;
use super::index::{Routing, TriggerIndex};
use super::order;

pub struct SequentialExecutor<'a> {
    index: &'a TriggerIndex,
    scope: &'a RunScope,
    results: Vec<RuleResult>,
}

impl<'a> SequentialExecutor<'a> {
    pub fn new(index: &'a TriggerIndex, scope: &'a RunScope) -> Self {
        Self {
            index,
            scope,
            results: Vec::new(),
        }
    }

    /// Run the plain rules among `roots` and return the collected results.
    pub fn run(mut self, roots: &[RuleRef]) -> Result<Vec<RuleResult>> {
        self.execute(&order::plain(roots), Routing::Route)?;
        Ok(self.results)
    }

    fn execute(&mut self, rules: &[RuleRef], routing: Routing) -> Result<()> {
        for rule in order::run_sequence(rules) {
            self.execute_rule(&rule, routing)?;
        }
        Ok(())
    }

    fn execute_rule(&mut self, rule: &RuleRef, routing: Routing) -> Result<()> {
        let index = self.index;
        let nested_first = rule.configuration().invoke_nested_rules_first;

        if nested_first {
            self.execute(&order::nested_pass(rule, false), Routing::Route)?;
        }

        if self.scope.can_invoke(rule) {
            if nested_first {
                self.execute(&order::nested_pass(rule, true), Routing::Route)?;
            }

            self.execute(index.proactive_for(rule.kind()), Routing::Route)?;

            match invoke_hooks(rule)? {
                Ok(result) => self.record(rule, result),
                Err(error) => {
                    let handlers = index.route_failure(rule, error, routing)?;
                    self.execute(handlers, Routing::Fatal)?;
                }
            }

            self.scope.absorb_terminate(rule);
            self.execute(index.reactive_for(rule.kind()), Routing::Route)?;

            if !nested_first {
                self.execute(&order::nested_pass(rule, true), Routing::Route)?;
            }
        }

        if !nested_first {
            self.execute(&order::nested_pass(rule, false), Routing::Route)?;
        }
        Ok(())
    }

    fn record(&mut self, rule: &RuleContext, result: Option<RuleResult>) {
        match result {
            Some(mut result) => {
                result.tag_if_unnamed(rule.kind());
                debug!(rule = %rule.kind(), run_id = %self.scope.run_id(), "rule result recorded");
                self.results.push(result);
            }
            None => debug!(rule = %rule.kind(), "rule returned no result"),
        }
    }
}

/// Run `before_invoke → invoke → after_invoke`.
///
/// The outer `Result` carries engine faults, the inner one the rule's own
/// failure.
fn invoke_hooks(rule: &RuleRef) -> Result<anyhow::Result<Option<RuleResult>>> {
    let mut body = rule
        .body()
        .try_lock()
        .map_err(|_| EngineError::RuleBusy(rule.name().to_string()))?;

    match &mut *body {
        RuleBody::Sync(body) => Ok(run_hooks(body.as_mut(), rule.context())),
        RuleBody::Async(_) => Err(EngineError::IncompatibleRule {
            rule: rule.name().to_string(),
            executor: "sequential",
        }),
    }
}

fn run_hooks(body: &mut dyn Rule, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
    body.before_invoke(rule)?;
    let result = body.invoke(rule)?;
    body.after_invoke(rule)?;
    Ok(result)
}
