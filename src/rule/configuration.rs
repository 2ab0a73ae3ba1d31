// src/rule/configuration.rs

//! Per-run rule configuration.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::exchange::RunId;

/// Predicate gating whether a rule may run this pass.
pub type Constraint = Arc<dyn Fn() -> bool + Send + Sync>;

/// Scheduling knobs of a rule.
///
/// A rule declares its configuration once; every run works on a clone
/// stamped with that run's [`RunId`].
#[derive(Clone, Default)]
pub struct Configuration {
    /// `None` means "always runnable".
    pub constraint: Option<Constraint>,
    /// Explicit position; ordered rules run before unordered ones.
    pub execution_order: Option<i32>,
    pub skip: bool,
    /// Three-valued: unset, `false`, `true`. A rule that sets `true` stops
    /// the rest of the run.
    pub terminate: Option<bool>,
    pub invoke_nested_rules_first: bool,
    pub nested_rules_inherit_constraint: bool,
    /// Nested rule only runs if its parent passed its gate.
    pub invoke_only_if_parent: bool,
    pub(crate) run_id: Option<RunId>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constraint(mut self, constraint: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.constraint = Some(Arc::new(constraint));
        self
    }

    pub fn with_execution_order(mut self, order: i32) -> Self {
        self.execution_order = Some(order);
        self
    }

    /// Run this rule's id, once it has been attached to a run.
    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    /// `!skip && constraint()`.
    pub fn can_invoke(&self) -> bool {
        !self.skip && self.constraint.as_ref().is_none_or(|constraint| constraint())
    }

    pub fn requests_termination(&self) -> bool {
        self.terminate == Some(true)
    }

    pub(crate) fn stamped(&self, run_id: RunId) -> Self {
        Self {
            run_id: Some(run_id),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("constraint", &self.constraint.is_some())
            .field("execution_order", &self.execution_order)
            .field("skip", &self.skip)
            .field("terminate", &self.terminate)
            .field("invoke_nested_rules_first", &self.invoke_nested_rules_first)
            .field(
                "nested_rules_inherit_constraint",
                &self.nested_rules_inherit_constraint,
            )
            .field("invoke_only_if_parent", &self.invoke_only_if_parent)
            .field("run_id", &self.run_id)
            .finish()
    }
}

/// How a parallel rule's task is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskCreation {
    /// Spawn onto the selected runtime.
    #[default]
    Default,
    /// Drive the rule on a dedicated blocking thread.
    LongRunning,
}

/// Dispatch policy for rules flagged parallel.
#[derive(Debug, Clone, Default)]
pub struct ParallelConfiguration {
    pub cancellation: Option<CancellationToken>,
    pub creation: TaskCreation,
    /// Runtime to spawn on; the current runtime when unset.
    pub scheduler: Option<Handle>,
    /// Parallel nested rules take over this rule's scheduler and creation
    /// options.
    pub nested_parallel_rules_inherit: bool,
}

impl ParallelConfiguration {
    /// Derived policy for a nested rule of a parent that passes its policy
    /// down. The child keeps its own cancellation source.
    pub(crate) fn inherited_by(&self, child: &ParallelConfiguration) -> Self {
        Self {
            cancellation: child.cancellation.clone(),
            creation: self.creation,
            scheduler: self.scheduler.clone(),
            nested_parallel_rules_inherit: true,
        }
    }
}
