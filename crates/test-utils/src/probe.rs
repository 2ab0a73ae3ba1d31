#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rulekit::rule::{RuleContext, RuleResult};

use crate::Journal;

type DeclareFn = Arc<dyn Fn(&RuleContext) + Send + Sync>;
type InvokeFn = Arc<dyn Fn(&RuleContext) -> anyhow::Result<()> + Send + Sync>;

/// Scriptable rule behaviour shared by the rule types that
/// [`probe_rules!`](crate::probe_rules) and
/// [`probe_async_rules!`](crate::probe_async_rules) declare.
///
/// By default a probe journals its rule's type name on every invocation
/// and returns a result whose output is that name as a `String`.
#[derive(Clone)]
pub struct Probe {
    journal: Journal,
    setup_journal: Option<Journal>,
    declare: Option<DeclareFn>,
    on_invoke: Option<InvokeFn>,
    failure: Option<String>,
    setup_failure: Option<String>,
    returns_none: bool,
    delay: Option<Duration>,
}

impl Probe {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            setup_journal: None,
            declare: None,
            on_invoke: None,
            failure: None,
            setup_failure: None,
            returns_none: false,
            delay: None,
        }
    }

    /// Run `f` when the rule is wrapped (roles, observed rule,
    /// configuration, nested rules).
    pub fn declare(mut self, f: impl Fn(&RuleContext) + Send + Sync + 'static) -> Self {
        self.declare = Some(Arc::new(f));
        self
    }

    /// Run `f` after the declare hook set so far.
    pub fn declare_also(mut self, f: impl Fn(&RuleContext) + Send + Sync + 'static) -> Self {
        let first = self.declare.take();
        self.declare = Some(Arc::new(move |rule: &RuleContext| {
            if let Some(first) = &first {
                first(rule);
            }
            f(rule);
        }));
        self
    }

    /// Run `f` inside `invoke`, after journaling; an `Err` fails the rule.
    pub fn on_invoke(
        mut self,
        f: impl Fn(&RuleContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_invoke = Some(Arc::new(f));
        self
    }

    pub fn fails_with(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn fails_setup(mut self, message: &str) -> Self {
        self.setup_failure = Some(message.to_string());
        self
    }

    /// Journal setup hooks as `setup:<Name>` into `journal`.
    pub fn setup_journal(mut self, journal: &Journal) -> Self {
        self.setup_journal = Some(journal.clone());
        self
    }

    pub fn returns_none(mut self) -> Self {
        self.returns_none = true;
        self
    }

    /// Sleep inside `invoke` (thread sleep for sync rules, tokio sleep for
    /// async ones).
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[doc(hidden)]
    pub fn run_declare(&self, rule: &RuleContext) {
        if let Some(declare) = &self.declare {
            declare(rule);
        }
    }

    #[doc(hidden)]
    pub fn run_initialize(&self, rule: &RuleContext) -> anyhow::Result<()> {
        if let Some(journal) = &self.setup_journal {
            journal.record(format!("setup:{}", rule.name()));
        }
        match &self.setup_failure {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }

    #[doc(hidden)]
    pub fn run_invoke(&self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.finish_invoke(rule)
    }

    #[doc(hidden)]
    pub async fn run_invoke_async(&self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.finish_invoke(rule)
    }

    fn finish_invoke(&self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        self.journal.record(rule.name());
        if let Some(on_invoke) = &self.on_invoke {
            on_invoke(rule)?;
        }
        if let Some(message) = &self.failure {
            anyhow::bail!("{message}");
        }
        if self.returns_none {
            return Ok(None);
        }
        Ok(Some(RuleResult::with_output(rule.name().to_string())))
    }
}

/// Declare synchronous probe rule types.
///
/// ```ignore
/// probe_rules!(Alpha, Beta);
/// let instance = Alpha::instance(Probe::new(&journal));
/// ```
#[macro_export]
macro_rules! probe_rules {
    ($($name:ident),+ $(,)?) => {
        $(
            pub struct $name(pub $crate::Probe);

            impl $name {
                #[allow(dead_code)]
                pub fn instance(probe: $crate::Probe) -> $crate::rulekit::rule::RuleInstance {
                    $crate::rulekit::rule::RuleInstance::new($name(probe))
                }
            }

            impl $crate::rulekit::rule::Rule for $name {
                fn declare(&self, rule: &$crate::rulekit::rule::RuleContext) {
                    self.0.run_declare(rule)
                }

                fn initialize(
                    &mut self,
                    rule: &$crate::rulekit::rule::RuleContext,
                ) -> $crate::anyhow::Result<()> {
                    self.0.run_initialize(rule)
                }

                fn invoke(
                    &mut self,
                    rule: &$crate::rulekit::rule::RuleContext,
                ) -> $crate::anyhow::Result<Option<$crate::rulekit::rule::RuleResult>> {
                    self.0.run_invoke(rule)
                }
            }
        )+
    };
}

/// Declare asynchronous probe rule types.
#[macro_export]
macro_rules! probe_async_rules {
    ($($name:ident),+ $(,)?) => {
        $(
            pub struct $name(pub $crate::Probe);

            impl $name {
                #[allow(dead_code)]
                pub fn instance(probe: $crate::Probe) -> $crate::rulekit::rule::RuleInstance {
                    $crate::rulekit::rule::RuleInstance::new_async($name(probe))
                }
            }

            #[$crate::async_trait::async_trait]
            impl $crate::rulekit::rule::AsyncRule for $name {
                fn declare(&self, rule: &$crate::rulekit::rule::RuleContext) {
                    self.0.run_declare(rule)
                }

                async fn initialize(
                    &mut self,
                    rule: &$crate::rulekit::rule::RuleContext,
                ) -> $crate::anyhow::Result<()> {
                    self.0.run_initialize(rule)
                }

                async fn invoke(
                    &mut self,
                    rule: &$crate::rulekit::rule::RuleContext,
                ) -> $crate::anyhow::Result<Option<$crate::rulekit::rule::RuleResult>> {
                    self.0.run_invoke_async(rule).await
                }
            }
        )+
    };
}
