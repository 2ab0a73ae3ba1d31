#![allow(dead_code)]

pub use rulekit_test_utils::{Journal, Probe, init_tracing, with_timeout};

use rulekit::rule::{RuleDefinition, RuleInstance, RuleResult, model};

/// Definition bound to a throwaway unit model.
pub fn def(instance: RuleInstance) -> RuleDefinition {
    RuleDefinition::new(instance, model(()))
}

/// Result names in recorded order.
pub fn names(results: &[RuleResult]) -> Vec<String> {
    results
        .iter()
        .map(|result| result.name().unwrap_or("<unnamed>").to_string())
        .collect()
}

/// Result names, sorted; for runs whose order is not guaranteed.
pub fn sorted_names(results: &[RuleResult]) -> Vec<String> {
    let mut names = names(results);
    names.sort();
    names
}
