// tests/exception_routing.rs

mod common;
use crate::common::{Journal, Probe, def, init_tracing, names};

use std::sync::{Arc, Mutex};

use rulekit::engine::RuleEngine;
use rulekit::errors::EngineError;
use rulekit::rule::{RuleContext, RuleResultsExt};
use rulekit_test_utils::probe_rules;

probe_rules!(Flaky, Steady, Catcher, Backup, CatchAll, CatchAllToo, Listener);

type Seen = Arc<Mutex<Vec<Arc<anyhow::Error>>>>;

fn handler_of_flaky(journal: &Journal, seen: &Seen) -> Probe {
    let seen = Arc::clone(seen);
    Probe::new(journal)
        .declare(|rule| {
            rule.set_exception_handler(true);
            rule.observe::<Flaky>();
        })
        .on_invoke(move |rule| {
            record_error(&seen, rule);
            Ok(())
        })
}

fn global_handler(journal: &Journal, seen: &Seen) -> Probe {
    let seen = Arc::clone(seen);
    Probe::new(journal)
        .declare(|rule| rule.set_global_exception_handler(true))
        .on_invoke(move |rule| {
            record_error(&seen, rule);
            Ok(())
        })
}

fn record_error(seen: &Seen, rule: &RuleContext) {
    if let Some(error) = rule.unhandled_error() {
        seen.lock().unwrap().push(error);
    }
}

#[test]
fn handler_receives_the_failure_and_the_run_continues() {
    init_tracing();
    let journal = Journal::new();
    let seen = Seen::default();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Flaky::instance(Probe::new(&journal).fails_with("boom"))),
        def(Catcher::instance(handler_of_flaky(&journal, &seen))),
        def(Steady::instance(Probe::new(&journal))),
    ]);

    let results = engine.execute().unwrap();

    assert_eq!(journal.entries(), ["Flaky", "Catcher", "Steady"]);
    assert_eq!(names(&results), ["Catcher", "Steady"]);
    assert!(results.find_result_for::<Flaky>().is_none());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].to_string(), "boom");
}

#[test]
fn every_handler_sees_the_same_error_instance() {
    init_tracing();
    let journal = Journal::new();
    let seen = Seen::default();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Flaky::instance(Probe::new(&journal).fails_with("boom"))),
        def(Catcher::instance(handler_of_flaky(&journal, &seen))),
        def(Backup::instance(handler_of_flaky(&journal, &seen))),
    ]);

    engine.execute().unwrap();

    assert_eq!(journal.entries(), ["Flaky", "Catcher", "Backup"]);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(Arc::ptr_eq(&seen[0], &seen[1]));

    let failed = engine.rules()[0].live().unwrap().unhandled_error().unwrap();
    assert!(Arc::ptr_eq(&failed, &seen[0]));
}

#[test]
fn global_handler_catches_failures_without_a_specific_handler() {
    init_tracing();
    let journal = Journal::new();
    let seen = Seen::default();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Steady::instance(Probe::new(&journal).fails_with("steady broke"))),
        def(CatchAll::instance(global_handler(&journal, &seen))),
    ]);

    let results = engine.execute().unwrap();

    assert_eq!(journal.entries(), ["Steady", "CatchAll"]);
    assert_eq!(names(&results), ["CatchAll"]);
    assert_eq!(seen.lock().unwrap()[0].to_string(), "steady broke");
}

#[test]
fn specific_handlers_take_precedence_over_the_global_one() {
    init_tracing();
    let journal = Journal::new();
    let seen = Seen::default();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Flaky::instance(Probe::new(&journal).fails_with("boom"))),
        def(CatchAll::instance(global_handler(&journal, &seen))),
        def(Catcher::instance(handler_of_flaky(&journal, &seen))),
    ]);

    engine.execute().unwrap();

    assert_eq!(journal.entries(), ["Flaky", "Catcher"]);
}

#[test]
fn two_global_handlers_fail_before_any_rule_runs() {
    init_tracing();
    let journal = Journal::new();
    let seen = Seen::default();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Steady::instance(Probe::new(&journal))),
        def(CatchAll::instance(global_handler(&journal, &seen))),
        def(CatchAllToo::instance(global_handler(&journal, &seen))),
    ]);

    let err = engine.execute().unwrap_err();

    assert!(matches!(err, EngineError::GlobalHandler(2)));
    assert!(journal.is_empty());
}

#[test]
fn failure_without_any_handler_aborts_the_run() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Flaky::instance(Probe::new(&journal).fails_with("boom"))),
        def(Steady::instance(Probe::new(&journal))),
    ]);

    let err = engine.execute().unwrap_err();

    assert!(matches!(err, EngineError::Unhandled { ref rule, .. } if rule == "Flaky"));
    assert_eq!(err.rule_error().unwrap().to_string(), "boom");
    assert_eq!(journal.entries(), ["Flaky"]);
}

#[test]
fn failing_handler_is_fatal() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Flaky::instance(Probe::new(&journal).fails_with("boom"))),
        def(Catcher::instance(
            Probe::new(&journal)
                .declare(|rule| {
                    rule.set_exception_handler(true);
                    rule.observe::<Flaky>();
                })
                .fails_with("handler broke"),
        )),
        def(Steady::instance(Probe::new(&journal))),
    ]);

    let err = engine.execute().unwrap_err();

    assert!(matches!(err, EngineError::HandlerFailed { ref rule, .. } if rule == "Catcher"));
    assert_eq!(err.rule_error().unwrap().to_string(), "handler broke");
    assert_eq!(journal.entries(), ["Flaky", "Catcher"]);
}

#[test]
fn reactive_links_still_run_after_a_handled_failure() {
    init_tracing();
    let journal = Journal::new();
    let seen = Seen::default();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Flaky::instance(Probe::new(&journal).fails_with("boom"))),
        def(Catcher::instance(handler_of_flaky(&journal, &seen))),
        def(Listener::instance(Probe::new(&journal).declare(|rule| {
            rule.set_reactive(true);
            rule.observe::<Flaky>();
        }))),
    ]);

    engine.execute().unwrap();

    assert_eq!(journal.entries(), ["Flaky", "Catcher", "Listener"]);
}

#[test]
fn unhandled_error_is_cleared_on_the_next_run() {
    init_tracing();
    let journal = Journal::new();
    let seen = Seen::default();
    let fail_once = Arc::new(Mutex::new(true));
    let flaky = {
        let fail_once = Arc::clone(&fail_once);
        Probe::new(&journal).on_invoke(move |_| {
            if std::mem::replace(&mut *fail_once.lock().unwrap(), false) {
                anyhow::bail!("first run fails");
            }
            Ok(())
        })
    };
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Flaky::instance(flaky)),
        def(Catcher::instance(handler_of_flaky(&journal, &seen))),
    ]);

    engine.execute().unwrap();
    assert!(engine.rules()[0].live().unwrap().unhandled_error().is_some());

    let results = engine.execute().unwrap();
    assert_eq!(names(&results), ["Flaky"]);
    assert!(engine.rules()[0].live().unwrap().unhandled_error().is_none());
}
