// tests/nested_rules.rs

mod common;
use crate::common::{Journal, Probe, def, init_tracing};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rulekit::engine::RuleEngine;
use rulekit::rule::Configuration;
use rulekit_test_utils::probe_rules;

probe_rules!(Parent, Free, Cond, Child, Grand, Sibling, First, Second);

/// A parent with one unconditional child (`Free`) and one child that only
/// runs when the parent passed its gate (`Cond`).
fn parent(journal: &Journal, configure: impl Fn(&mut Configuration) + Send + Sync + 'static) -> Probe {
    let free = Probe::new(journal);
    let cond = Probe::new(journal);
    Probe::new(journal).declare(move |rule| {
        rule.configure(&configure);
        rule.add_rule(def(Free::instance(free.clone())));
        rule.add_rule(def(Cond::instance(cond.clone())).only_if_parent());
    })
}

fn run(journal: &Journal, parent_probe: Probe) -> Vec<String> {
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Parent::instance(parent_probe)),
        def(Sibling::instance(Probe::new(journal))),
    ]);
    engine.execute().unwrap();
    journal.entries()
}

#[test]
fn children_run_after_their_parent_conditional_ones_first() {
    init_tracing();
    let journal = Journal::new();

    let entries = run(&journal, parent(&journal, |_| {}));

    assert_eq!(entries, ["Parent", "Cond", "Free", "Sibling"]);
}

#[test]
fn nested_first_parent_runs_after_its_children() {
    init_tracing();
    let journal = Journal::new();

    let entries = run(
        &journal,
        parent(&journal, |c| c.invoke_nested_rules_first = true),
    );

    assert_eq!(entries, ["Free", "Cond", "Parent", "Sibling"]);
}

#[test]
fn gated_parent_still_runs_unconditional_children() {
    init_tracing();
    let journal = Journal::new();

    let entries = run(&journal, parent(&journal, |c| c.skip = true));

    assert_eq!(entries, ["Free", "Sibling"]);
}

#[test]
fn gated_nested_first_parent_still_runs_unconditional_children() {
    init_tracing();
    let journal = Journal::new();

    let entries = run(
        &journal,
        parent(&journal, |c| {
            c.invoke_nested_rules_first = true;
            *c = c.clone().with_constraint(|| false);
        }),
    );

    assert_eq!(entries, ["Free", "Sibling"]);
}

#[test]
fn inherited_constraint_gates_the_children_too() {
    init_tracing();
    let journal = Journal::new();

    let entries = run(
        &journal,
        parent(&journal, |c| {
            c.nested_rules_inherit_constraint = true;
            *c = c.clone().with_constraint(|| false);
        }),
    );

    assert_eq!(entries, ["Sibling"]);
}

#[test]
fn inherited_constraint_is_evaluated_on_every_run() {
    init_tracing();
    let journal = Journal::new();
    let open = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&open);
    let probe = parent(&journal, move |c| {
        let gate = Arc::clone(&gate);
        c.nested_rules_inherit_constraint = true;
        *c = c.clone().with_constraint(move || gate.load(Ordering::SeqCst));
    });
    let mut engine = RuleEngine::new();
    engine.add_rule(def(Parent::instance(probe)));

    engine.execute().unwrap();
    assert!(journal.is_empty());

    open.store(true, Ordering::SeqCst);
    engine.execute().unwrap();
    assert_eq!(journal.entries(), ["Parent", "Cond", "Free"]);
}

#[test]
fn children_follow_their_own_execution_order() {
    init_tracing();
    let journal = Journal::new();
    let first = Probe::new(&journal);
    let second = Probe::new(&journal);
    let holder = Probe::new(&journal).declare(move |rule| {
        rule.add_rule(def(Second::instance(second.clone())).execution_order(2));
        rule.add_rule(def(First::instance(first.clone())).execution_order(1));
    });

    let entries = run(&journal, holder);

    assert_eq!(entries, ["Parent", "First", "Second", "Sibling"]);
}

#[test]
fn grandchildren_run_depth_first() {
    init_tracing();
    let journal = Journal::new();
    let grand = Probe::new(&journal).on_invoke(|rule| {
        assert!(!rule.is_nested());
        Ok(())
    });
    let child = Probe::new(&journal).declare(move |rule| {
        rule.add_rule(def(Grand::instance(grand.clone())));
    });
    let holder = Probe::new(&journal)
        .declare(move |rule| rule.add_rule(def(Child::instance(child.clone()))))
        .on_invoke(|rule| {
            assert!(rule.is_nested());
            Ok(())
        });

    let entries = run(&journal, holder);

    assert_eq!(entries, ["Parent", "Child", "Grand", "Sibling"]);
}

#[test]
fn terminate_in_a_child_stops_the_rest_of_the_run() {
    init_tracing();
    let journal = Journal::new();
    let child = Probe::new(&journal).declare(|rule| rule.configure(|c| c.terminate = Some(true)));
    let grand = Probe::new(&journal);
    let holder = Probe::new(&journal).declare(move |rule| {
        rule.add_rule(def(Child::instance(child.clone())));
        rule.add_rule(def(Grand::instance(grand.clone())));
    });

    let entries = run(&journal, holder);

    assert_eq!(entries, ["Parent", "Child"]);
}
