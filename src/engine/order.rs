// src/engine/order.rs

//! Run-order and filtering helpers shared by both executors.
//!
//! Ordered rules (explicit `execution_order`) come first, stably sorted by
//! their order value; unordered rules follow in declaration order.

use crate::rule::RuleRef;

/// Rules eligible for normal scheduling: no trigger role set.
pub fn plain(rules: &[RuleRef]) -> Vec<RuleRef> {
    rules.iter().filter(|rule| rule.is_plain()).cloned().collect()
}

/// Sequential run order of `rules`.
pub fn run_sequence(rules: &[RuleRef]) -> Vec<RuleRef> {
    sequence_where(rules, |_| true)
}

/// Rules the concurrent executor dispatches as independent tasks:
/// parallel async rules without an explicit order, in declaration order.
pub fn parallel_batch(rules: &[RuleRef]) -> Vec<RuleRef> {
    rules
        .iter()
        .filter(|rule| is_dispatched(rule))
        .cloned()
        .collect()
}

/// Concurrent run order: like [`run_sequence`], minus the
/// [`parallel_batch`].
pub fn async_sequence(rules: &[RuleRef]) -> Vec<RuleRef> {
    sequence_where(rules, |rule| !is_dispatched(rule))
}

/// Plain nested rules of `parent` whose `invoke_only_if_parent` flag equals
/// `conditioned`. The flag is only read here.
pub fn nested_pass(parent: &RuleRef, conditioned: bool) -> Vec<RuleRef> {
    parent
        .nested_rules()
        .into_iter()
        .filter(|child| child.is_plain())
        .filter(|child| child.configuration().invoke_only_if_parent == conditioned)
        .collect()
}

fn is_dispatched(rule: &RuleRef) -> bool {
    rule.is_async() && rule.is_parallel() && rule.configuration().execution_order.is_none()
}

fn sequence_where(rules: &[RuleRef], keep: impl Fn(&RuleRef) -> bool) -> Vec<RuleRef> {
    let mut ordered = Vec::new();
    let mut unordered = Vec::new();

    for rule in rules.iter().filter(|rule| keep(rule)) {
        match rule.configuration().execution_order {
            Some(order) => ordered.push((order, rule.clone())),
            None => unordered.push(rule.clone()),
        }
    }

    // `sort_by_key` is stable: equal orders keep declaration order.
    ordered.sort_by_key(|(order, _)| *order);

    ordered
        .into_iter()
        .map(|(_, rule)| rule)
        .chain(unordered)
        .collect()
}
