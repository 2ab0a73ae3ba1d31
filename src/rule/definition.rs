// src/rule/definition.rs

//! Rule definitions and live rule nodes.
//!
//! A [`RuleDefinition`] is what callers (and parent rules) hand to the
//! engine: a rule instance or an unresolved [`RuleToken`], plus the model
//! to bind. The resolver replaces the slot in place with a [`RuleRef`]
//! once the rule is live, so a second run over the same definitions reuses
//! the same instances.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::{Model, RuleBody, RuleContext, RuleInstance, RuleKind, RuleToken};

/// Shared handle to a live rule.
///
/// The tree owns each node once; the trigger index and the executors only
/// hold additional references for the duration of a run.
pub type RuleRef = Arc<RuleNode>;

/// A live rule: engine-owned state plus the user body.
pub struct RuleNode {
    context: RuleContext,
    body: tokio::sync::Mutex<RuleBody>,
}

impl RuleNode {
    /// Wrap an instance, letting it declare its roles and configuration.
    pub(crate) fn wrap(instance: RuleInstance) -> RuleRef {
        let (kind, body) = instance.into_parts();
        let context = RuleContext::new(kind, body.is_async());
        body.declare(&context);
        Arc::new(Self {
            context,
            body: tokio::sync::Mutex::new(body),
        })
    }

    pub fn context(&self) -> &RuleContext {
        &self.context
    }

    pub(crate) fn body(&self) -> &tokio::sync::Mutex<RuleBody> {
        &self.body
    }
}

impl Deref for RuleNode {
    type Target = RuleContext;

    fn deref(&self) -> &RuleContext {
        &self.context
    }
}

impl fmt::Debug for RuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleNode")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// What a definition currently holds.
pub enum RuleSlot {
    /// Not yet resolved; handed to the engine's resolver.
    Token(RuleToken),
    /// Instance supplied directly, not yet wrapped.
    Instance(RuleInstance),
    /// Resolved and wrapped.
    Live(RuleRef),
}

impl fmt::Debug for RuleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSlot::Token(token) => f.debug_tuple("Token").field(&token.kind()).finish(),
            RuleSlot::Instance(instance) => f.debug_tuple("Instance").field(&instance.kind()).finish(),
            RuleSlot::Live(node) => f.debug_tuple("Live").field(&node.kind()).finish(),
        }
    }
}

/// A rule (or type token) paired with the model it is bound to.
#[derive(Debug)]
pub struct RuleDefinition {
    pub(crate) slot: RuleSlot,
    pub(crate) model: Option<Model>,
    pub(crate) execution_order: Option<i32>,
    pub(crate) invoke_only_if_parent: bool,
}

impl RuleDefinition {
    pub fn new(rule: RuleInstance, model: Model) -> Self {
        Self::from_slot(RuleSlot::Instance(rule), Some(model))
    }

    pub fn without_model(rule: RuleInstance) -> Self {
        Self::from_slot(RuleSlot::Instance(rule), None)
    }

    /// Definition resolved later through the engine's
    /// [`RuleResolver`](crate::engine::RuleResolver).
    pub fn token(token: RuleToken, model: Model) -> Self {
        Self::from_slot(RuleSlot::Token(token), Some(model))
    }

    pub fn token_without_model(token: RuleToken) -> Self {
        Self::from_slot(RuleSlot::Token(token), None)
    }

    fn from_slot(slot: RuleSlot, model: Option<Model>) -> Self {
        Self {
            slot,
            model,
            execution_order: None,
            invoke_only_if_parent: false,
        }
    }

    /// Pin the rule's execution order, overriding what the rule declared.
    pub fn execution_order(mut self, order: i32) -> Self {
        self.execution_order = Some(order);
        self
    }

    /// Nested rule that only runs when its parent passed its gate.
    pub fn only_if_parent(mut self) -> Self {
        self.invoke_only_if_parent = true;
        self
    }

    pub fn slot(&self) -> &RuleSlot {
        &self.slot
    }

    pub fn kind(&self) -> RuleKind {
        match &self.slot {
            RuleSlot::Token(token) => token.kind(),
            RuleSlot::Instance(instance) => instance.kind(),
            RuleSlot::Live(node) => node.kind(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// The live rule, once resolved.
    pub fn live(&self) -> Option<&RuleRef> {
        match &self.slot {
            RuleSlot::Live(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.live().is_some()
    }

    /// Definition-level overrides, applied once when the rule is wrapped.
    pub(crate) fn apply_overrides(&self, node: &RuleNode) {
        let order = self.execution_order;
        let only_if_parent = self.invoke_only_if_parent;
        if order.is_none() && !only_if_parent {
            return;
        }
        node.configure(|configuration| {
            if order.is_some() {
                configuration.execution_order = order;
            }
            if only_if_parent {
                configuration.invoke_only_if_parent = true;
            }
        });
    }
}
