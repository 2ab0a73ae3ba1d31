// src/rule/mod.rs

//! Rule data model.
//!
//! - [`traits`] holds the hook surface ([`Rule`], [`AsyncRule`]) and the
//!   type-erased [`RuleInstance`] wrapper.
//! - [`context`] is the engine-owned, per-rule state a hook sees.
//! - [`configuration`] holds the per-run [`Configuration`] and
//!   [`ParallelConfiguration`].
//! - [`definition`] pairs a rule (or a type token) with its model, and
//!   holds the live [`RuleNode`] the resolver produces.
//! - [`result`] is the [`RuleResult`] and lookup helpers over result sets.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub mod configuration;
pub mod context;
pub mod definition;
pub mod result;
pub mod traits;

pub use configuration::{Configuration, Constraint, ParallelConfiguration, TaskCreation};
pub use context::RuleContext;
pub use definition::{RuleDefinition, RuleNode, RuleRef, RuleSlot};
pub use result::{RuleResult, RuleResultsExt};
pub use traits::{AsyncRule, Rule, RuleBody, RuleInstance};

/// Opaque model bound to a rule by its definition.
pub type Model = Arc<dyn Any + Send + Sync>;

/// Opaque value carried by results and exchange entries.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Wrap a value as a [`Model`].
pub fn model<T: Any + Send + Sync>(value: T) -> Model {
    Arc::new(value)
}

/// Identity of a concrete rule type.
///
/// Observation links (proactive / reactive / exception) are keyed by this.
/// Equality and hashing only look at the `TypeId`.
#[derive(Clone, Copy)]
pub struct RuleKind {
    id: TypeId,
    name: &'static str,
}

impl RuleKind {
    pub fn of<R: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<R>(),
            name: short_type_name(std::any::type_name::<R>()),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Unqualified type name, used as the default result name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for RuleKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RuleKind {}

impl Hash for RuleKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Unresolved reference to a rule type, turned into an instance by a
/// [`RuleResolver`](crate::engine::RuleResolver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleToken {
    kind: RuleKind,
}

impl RuleToken {
    pub fn of<R: 'static>() -> Self {
        Self {
            kind: RuleKind::of::<R>(),
        }
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

impl From<RuleKind> for RuleToken {
    fn from(kind: RuleKind) -> Self {
        Self { kind }
    }
}

/// `my_crate::rules::Discount<u8>` -> `Discount`.
fn short_type_name(full: &'static str) -> &'static str {
    let base = match full.find('<') {
        Some(idx) => &full[..idx],
        None => full,
    };
    base.rsplit("::").next().unwrap_or(base)
}
