// tests/resolver.rs

mod common;
use crate::common::{Journal, Probe, def, init_tracing, names, sorted_names, with_timeout};

use rulekit::engine::{RuleEngine, RuleRegistry};
use rulekit::errors::EngineError;
use rulekit::rule::{RuleDefinition, RuleInstance, RuleKind, RuleToken, model};
use rulekit_test_utils::{probe_async_rules, probe_rules};

probe_rules!(Root, Leaf, Other, Typed);
probe_async_rules!(AsyncRoot, AsyncLeaf);

fn registry_for_leaf(journal: &Journal) -> RuleRegistry {
    let probe = Probe::new(journal).setup_journal(journal);
    let mut registry = RuleRegistry::new();
    registry.register_with::<Leaf>(move || Leaf::instance(probe.clone()));
    registry
}

#[test]
fn root_tokens_resolve_through_the_registry() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new().with_resolver(registry_for_leaf(&journal));
    engine.add_rule(RuleDefinition::token(RuleToken::of::<Leaf>(), model(())));

    assert!(!engine.rules()[0].is_resolved());
    let results = engine.execute().unwrap();

    assert_eq!(names(&results), ["Leaf"]);
    assert!(engine.rules()[0].is_resolved());
    assert_eq!(engine.rules()[0].name(), "Leaf");
}

#[test]
fn nested_tokens_resolve_below_their_parent() {
    init_tracing();
    let journal = Journal::new();
    let root = Probe::new(&journal).declare(|rule| {
        rule.add_rule(RuleDefinition::token_without_model(RuleToken::of::<Leaf>()));
    });
    let mut engine = RuleEngine::new().with_resolver(registry_for_leaf(&journal));
    engine.add_rule(def(Root::instance(root)));

    engine.execute().unwrap();

    assert_eq!(journal.entries(), ["setup:Leaf", "Root", "Leaf"]);
}

#[test]
fn closures_can_resolve_tokens() {
    init_tracing();
    let journal = Journal::new();
    let probe = Probe::new(&journal);
    let resolver = move |token: &RuleToken| {
        (token.kind() == RuleKind::of::<Other>()).then(|| Other::instance(probe.clone()))
    };
    let mut engine = RuleEngine::new().with_resolver(resolver);
    engine.add_rule(RuleDefinition::token_without_model(RuleToken::of::<Other>()));

    engine.execute().unwrap();

    assert_eq!(journal.entries(), ["Other"]);
}

#[test]
fn unresolvable_token_fails_before_anything_runs() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new().with_resolver(registry_for_leaf(&journal));
    engine.add_rules([
        def(Root::instance(Probe::new(&journal))),
        RuleDefinition::token_without_model(RuleToken::of::<Other>()),
    ]);

    let err = engine.execute().unwrap_err();

    assert!(matches!(err, EngineError::UnresolvedRule(ref name) if name == "Other"));
    assert!(!journal.contains("Root"));
}

#[test]
fn tokens_without_a_resolver_are_unresolved() {
    init_tracing();
    let mut engine = RuleEngine::new();
    engine.add_rule(RuleDefinition::token_without_model(RuleToken::of::<Leaf>()));

    let err = engine.execute().unwrap_err();

    assert!(matches!(err, EngineError::UnresolvedRule(_)));
}

#[test]
fn setup_runs_depth_first_before_any_invocation() {
    init_tracing();
    let journal = Journal::new();
    let leaf = Probe::new(&journal).setup_journal(&journal);
    let root = Probe::new(&journal)
        .setup_journal(&journal)
        .declare(move |rule| rule.add_rule(def(Leaf::instance(leaf.clone()))));
    let other = Probe::new(&journal).setup_journal(&journal);
    let mut engine = RuleEngine::new();
    engine.add_rules([def(Root::instance(root)), def(Other::instance(other))]);

    engine.execute().unwrap();

    assert_eq!(
        journal.entries(),
        ["setup:Root", "setup:Leaf", "setup:Other", "Root", "Leaf", "Other"]
    );
}

#[test]
fn setup_failure_is_fatal() {
    init_tracing();
    let journal = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(Root::instance(Probe::new(&journal).fails_setup("no database"))),
        def(Other::instance(Probe::new(&journal))),
    ]);

    let err = engine.execute().unwrap_err();

    assert!(matches!(err, EngineError::SetupFailed { ref rule, .. } if rule == "Root"));
    assert_eq!(err.rule_error().unwrap().to_string(), "no database");
    assert!(journal.is_empty());
}

#[test]
fn models_are_bound_and_typed() {
    init_tracing();
    let journal = Journal::new();
    let typed = Probe::new(&journal).on_invoke(|rule| {
        assert_eq!(*rule.model::<u32>()?, 42);
        assert!(matches!(
            rule.model::<String>(),
            Err(EngineError::ModelMismatch { expected, .. }) if expected.ends_with("String")
        ));
        Ok(())
    });
    let untyped = Probe::new(&journal).on_invoke(|rule| {
        assert!(matches!(rule.model::<u32>(), Err(EngineError::ModelMissing(_))));
        assert!(rule.raw_model().is_none());
        Ok(())
    });
    let mut engine = RuleEngine::new();
    engine.add_rules([
        RuleDefinition::new(Typed::instance(typed), model(42u32)),
        RuleDefinition::without_model(Other::instance(untyped)),
    ]);

    let results = engine.execute().unwrap();

    assert_eq!(names(&results), ["Typed", "Other"]);
}

#[test]
fn instance_reports_its_kind() {
    let journal = Journal::new();
    let sync = Root::instance(Probe::new(&journal));
    let not_sync = AsyncRoot::instance(Probe::new(&journal));

    assert_eq!(sync.kind(), RuleKind::of::<Root>());
    assert!(!sync.is_async());
    assert!(not_sync.is_async());
    assert_eq!(RuleInstance::new(Root(Probe::new(&journal))).kind().name(), "Root");
}

#[test]
fn registry_reports_its_registrations() {
    let journal = Journal::new();
    let registry = registry_for_leaf(&journal);

    assert_eq!(registry.len(), 1);
    assert!(registry.contains(&RuleToken::of::<Leaf>()));
    assert!(!registry.contains(&RuleToken::of::<Other>()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_setup_settles_every_rule_before_failing() {
    init_tracing();
    let journal = Journal::new();
    let setups = Journal::new();
    let mut engine = RuleEngine::new();
    engine.add_rules([
        def(AsyncRoot::instance(
            Probe::new(&journal).setup_journal(&setups).fails_setup("broken"),
        )),
        def(AsyncLeaf::instance(Probe::new(&journal).setup_journal(&setups))),
        def(Other::instance(Probe::new(&journal).setup_journal(&setups))),
    ]);

    let err = with_timeout(engine.execute_async()).await.unwrap_err();

    assert!(matches!(err, EngineError::SetupFailed { ref rule, .. } if rule == "AsyncRoot"));
    let mut settled = setups.entries();
    settled.sort();
    assert_eq!(settled, ["setup:AsyncLeaf", "setup:AsyncRoot", "setup:Other"]);
    assert!(journal.is_empty());
}

#[tokio::test]
async fn concurrent_setup_expands_nested_rules() {
    init_tracing();
    let journal = Journal::new();
    let leaf = Probe::new(&journal).setup_journal(&journal);
    let root = Probe::new(&journal).declare(move |rule| {
        rule.add_rule(def(AsyncLeaf::instance(leaf.clone())));
    });
    let mut engine = RuleEngine::new();
    engine.add_rule(def(AsyncRoot::instance(root)));

    let results = with_timeout(engine.execute_async()).await.unwrap();

    assert_eq!(sorted_names(&results), ["AsyncLeaf", "AsyncRoot"]);
    assert_eq!(journal.entries(), ["setup:AsyncLeaf", "AsyncRoot", "AsyncLeaf"]);
}
