// src/rule/traits.rs

//! Hook surface implemented by rule bodies.
//!
//! Both traits describe the same lifecycle:
//!
//! 1. `declare`: called once when the instance is wrapped for the engine;
//!    set role flags, the observed rule, the configuration and nested rules.
//! 2. `initialize`: one-time setup, after the run's configuration has been
//!    stamped. May still add nested rules.
//! 3. `before_invoke` → `invoke` → `after_invoke`: every time the rule is
//!    scheduled and passes its gate.
//!
//! An `Err` from any of the invoke hooks is the rule's unhandled exception
//! and is routed to exception handlers. Returning `Ok(None)` from `invoke`
//! is legal; nothing is recorded for that invocation.

use std::fmt;

use async_trait::async_trait;

use super::{RuleContext, RuleKind, RuleResult};

/// Synchronous rule body, runnable by both executors.
pub trait Rule: Send + 'static {
    fn declare(&self, _rule: &RuleContext) {}

    fn initialize(&mut self, _rule: &RuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn before_invoke(&mut self, _rule: &RuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>>;

    fn after_invoke(&mut self, _rule: &RuleContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Asynchronous rule body, runnable by the concurrent executor only.
///
/// Only async rules may be dispatched as parallel tasks with their own
/// [`ParallelConfiguration`](super::ParallelConfiguration).
#[async_trait]
pub trait AsyncRule: Send + 'static {
    fn declare(&self, _rule: &RuleContext) {}

    async fn initialize(&mut self, _rule: &RuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_invoke(&mut self, _rule: &RuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>>;

    async fn after_invoke(&mut self, _rule: &RuleContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Type-erased rule body.
pub enum RuleBody {
    Sync(Box<dyn Rule>),
    Async(Box<dyn AsyncRule>),
}

impl RuleBody {
    pub fn is_async(&self) -> bool {
        matches!(self, RuleBody::Async(_))
    }

    pub(crate) fn declare(&self, rule: &RuleContext) {
        match self {
            RuleBody::Sync(body) => body.declare(rule),
            RuleBody::Async(body) => body.declare(rule),
        }
    }

    /// Setup hook; sync bodies run inline.
    pub(crate) async fn initialize(&mut self, rule: &RuleContext) -> anyhow::Result<()> {
        match self {
            RuleBody::Sync(body) => body.initialize(rule),
            RuleBody::Async(body) => body.initialize(rule).await,
        }
    }

    pub(crate) async fn before_invoke(&mut self, rule: &RuleContext) -> anyhow::Result<()> {
        match self {
            RuleBody::Sync(body) => body.before_invoke(rule),
            RuleBody::Async(body) => body.before_invoke(rule).await,
        }
    }

    pub(crate) async fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        match self {
            RuleBody::Sync(body) => body.invoke(rule),
            RuleBody::Async(body) => body.invoke(rule).await,
        }
    }

    pub(crate) async fn after_invoke(&mut self, rule: &RuleContext) -> anyhow::Result<()> {
        match self {
            RuleBody::Sync(body) => body.after_invoke(rule),
            RuleBody::Async(body) => body.after_invoke(rule).await,
        }
    }
}

/// A rule body together with the identity of its concrete type.
pub struct RuleInstance {
    kind: RuleKind,
    body: RuleBody,
}

impl RuleInstance {
    pub fn new<R: Rule>(rule: R) -> Self {
        Self {
            kind: RuleKind::of::<R>(),
            body: RuleBody::Sync(Box::new(rule)),
        }
    }

    pub fn new_async<R: AsyncRule>(rule: R) -> Self {
        Self {
            kind: RuleKind::of::<R>(),
            body: RuleBody::Async(Box::new(rule)),
        }
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn is_async(&self) -> bool {
        self.body.is_async()
    }

    pub(crate) fn into_parts(self) -> (RuleKind, RuleBody) {
        (self.kind, self.body)
    }
}

impl fmt::Debug for RuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleInstance")
            .field("kind", &self.kind)
            .field("async", &self.is_async())
            .finish()
    }
}
