// src/rule/result.rs

//! Rule results and lookups over a run's result set.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::{Payload, RuleKind};

/// Outcome of one rule invocation.
///
/// `name` is filled in with the rule's type name by the executor when the
/// rule body leaves it unset.
#[derive(Clone, Default)]
pub struct RuleResult {
    pub name: Option<String>,
    pub output: Option<Payload>,
    pub error: Option<String>,
}

impl RuleResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(value: impl Any + Send + Sync) -> Self {
        Self {
            output: Some(Arc::new(value)),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a recoverable, rule-reported error. This is data, not an
    /// unhandled failure; nothing is routed.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Typed view of the output.
    pub fn output<T: Any>(&self) -> Option<&T> {
        self.output.as_deref().and_then(|value| value.downcast_ref::<T>())
    }

    pub(crate) fn tag_if_unnamed(&mut self, kind: RuleKind) {
        if self.name.is_none() {
            self.name = Some(kind.name().to_string());
        }
    }
}

impl fmt::Debug for RuleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleResult")
            .field("name", &self.name)
            .field("output", &self.output.is_some())
            .field("error", &self.error)
            .finish()
    }
}

/// Lookups over a collection of results. Names compare ASCII
/// case-insensitively.
pub trait RuleResultsExt {
    fn find_result(&self, name: &str) -> Option<&RuleResult>;

    fn find_results(&self, name: &str) -> Vec<&RuleResult>;

    fn find_result_for<R: 'static>(&self) -> Option<&RuleResult> {
        self.find_result(RuleKind::of::<R>().name())
    }

    fn errors(&self) -> Vec<&RuleResult>;

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    fn first_error(&self) -> Option<&RuleResult> {
        self.errors().into_iter().next()
    }
}

fn name_matches(result: &RuleResult, name: &str) -> bool {
    result
        .name()
        .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name))
}

impl RuleResultsExt for [RuleResult] {
    fn find_result(&self, name: &str) -> Option<&RuleResult> {
        self.iter().find(|result| name_matches(result, name))
    }

    fn find_results(&self, name: &str) -> Vec<&RuleResult> {
        self.iter().filter(|result| name_matches(result, name)).collect()
    }

    fn errors(&self) -> Vec<&RuleResult> {
        self.iter().filter(|result| result.error.is_some()).collect()
    }
}
