// tests/trigger_links.rs

mod common;
use crate::common::{Journal, Probe, def, init_tracing, names};

use rulekit::engine::{RuleEngine, RuleRole, TriggerIndex};
use rulekit::errors::EngineError;
use rulekit::rule::RuleRef;
use rulekit_test_utils::probe_rules;

probe_rules!(Target, Before, After, AfterToo, Early, Holder, Loose);

fn proactive_on_target(journal: &Journal) -> Probe {
    Probe::new(journal).declare(|rule| {
        rule.set_proactive(true);
        rule.observe::<Target>();
    })
}

fn reactive_on_target(journal: &Journal) -> Probe {
    Probe::new(journal).declare(|rule| {
        rule.set_reactive(true);
        rule.observe::<Target>();
    })
}

#[test]
fn proactive_rule_runs_right_before_its_target() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Early::instance(
            Probe::new(&journal).declare(|rule| rule.configure(|c| c.execution_order = Some(1))),
        )),
        def(Target::instance(
            Probe::new(&journal).declare(|rule| rule.configure(|c| c.execution_order = Some(2))),
        )),
        def(Before::instance(proactive_on_target(&journal))),
    ]);

    let results = engine.execute().unwrap();

    assert_eq!(names(&results), ["Early", "Before", "Target"]);
}

#[test]
fn reactive_rules_run_after_their_target_in_declaration_order() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(After::instance(reactive_on_target(&journal))),
        def(Target::instance(Probe::new(&journal))),
        def(AfterToo::instance(reactive_on_target(&journal))),
        def(Early::instance(Probe::new(&journal))),
    ]);

    engine.execute().unwrap();

    assert_eq!(journal.entries(), ["Target", "After", "AfterToo", "Early"]);
}

#[test]
fn links_wrap_the_target_on_both_sides() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(After::instance(reactive_on_target(&journal))),
        def(Before::instance(proactive_on_target(&journal))),
        def(Target::instance(Probe::new(&journal))),
    ]);

    engine.execute().unwrap();

    assert_eq!(journal.entries(), ["Before", "Target", "After"]);
}

#[test]
fn links_of_a_gated_target_do_not_run() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Target::instance(
            Probe::new(&journal).declare(|rule| rule.configure(|c| *c = c.clone().with_constraint(|| false))),
        )),
        def(Before::instance(proactive_on_target(&journal))),
        def(After::instance(reactive_on_target(&journal))),
        def(Early::instance(Probe::new(&journal))),
    ]);

    engine.execute().unwrap();

    assert_eq!(journal.entries(), ["Early"]);
}

#[test]
fn nested_trigger_rules_are_linked_too() {
    init_tracing();
    let journal = Journal::new();
    let child = reactive_on_target(&journal);
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Holder::instance(
            Probe::new(&journal).declare(move |rule| rule.add_rule(def(After::instance(child.clone())))),
        )),
        def(Target::instance(Probe::new(&journal))),
    ]);

    engine.execute().unwrap();

    // The reactive child is not part of its holder's nested pass.
    assert_eq!(journal.entries(), ["Holder", "Target", "After"]);
}

#[test]
fn trigger_without_observed_rule_is_rejected() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Target::instance(Probe::new(&journal))),
        def(Loose::instance(Probe::new(&journal).declare(|rule| rule.set_reactive(true)))),
    ]);

    let err = engine.execute().unwrap_err();

    assert!(matches!(err, EngineError::UnobservedTrigger(ref rule) if rule == "Loose"));
    assert!(journal.is_empty());
}

#[test]
fn second_observe_call_is_ignored() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Target::instance(Probe::new(&journal))),
        def(Early::instance(Probe::new(&journal))),
        def(After::instance(Probe::new(&journal).declare(|rule| {
            rule.set_reactive(true);
            assert!(rule.observe::<Target>());
            assert!(!rule.observe::<Early>());
        }))),
    ]);

    engine.execute().unwrap();

    assert_eq!(journal.entries(), ["Target", "After", "Early"]);
}

#[test]
fn index_classifies_every_live_rule() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Target::instance(Probe::new(&journal))),
        def(Before::instance(proactive_on_target(&journal))),
        def(After::instance(reactive_on_target(&journal))),
    ]);
    engine.execute().unwrap();

    let roots: Vec<RuleRef> = engine
        .rules()
        .iter()
        .filter_map(|definition| definition.live().cloned())
        .collect();
    let index = TriggerIndex::build(&roots).unwrap();

    assert_eq!(index.role_of(&roots[0]), Some(RuleRole::None));
    assert_eq!(index.role_of(&roots[1]), Some(RuleRole::Proactive));
    assert_eq!(index.role_of(&roots[2]), Some(RuleRole::Reactive));
    assert_eq!(index.proactive_for(roots[0].kind()).len(), 1);
    assert_eq!(index.reactive_for(roots[0].kind()).len(), 1);
    assert!(index.global_handler().is_none());
}
