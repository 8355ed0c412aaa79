//! Capability checks for condition state changes.
//!
//! Who may fulfil or abort a condition is decided outside the stores.
//! The condition store asks an [`AccessControl`] implementation and
//! treats the answer as final.

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Actions guarded by an access-control check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Action {
    /// Move a condition to `Fulfilled` or `Aborted`.
    UpdateConditionState,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpdateConditionState => write!(f, "update condition state"),
        }
    }
}

/// Capability check injected into the condition store.
///
/// `resource` is the condition's type reference: the handler family the
/// condition was bound to when its agreement was created.
pub trait AccessControl: Send + Sync {
    fn can(&self, actor: &Address, action: Action, resource: &Address) -> bool;
}

impl<F> AccessControl for F
where
    F: Fn(&Address, Action, &Address) -> bool + Send + Sync,
{
    fn can(&self, actor: &Address, action: Action, resource: &Address) -> bool {
        self(actor, action, resource)
    }
}

/// Registry of handlers allowed to act for each condition type.
///
/// With `self_handling` enabled (the default), a condition type reference
/// is also its own handler: the deployed handler's address doubles as the
/// type reference templates point at.
#[derive(Debug, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<Address, HashSet<Address>>,
    self_handling: bool,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            self_handling: true,
        }
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where only explicitly registered handlers may act.
    pub fn explicit_only() -> Self {
        Self {
            handlers: HashMap::new(),
            self_handling: false,
        }
    }

    /// Allow `handler` to act for conditions of `type_ref`.
    pub fn register(mut self, type_ref: Address, handler: Address) -> Self {
        self.handlers.entry(type_ref).or_default().insert(handler);
        self
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn unregister(&mut self, type_ref: &Address, handler: &Address) -> bool {
        self.handlers
            .get_mut(type_ref)
            .is_some_and(|set| set.remove(handler))
    }

    pub fn is_handler(&self, type_ref: &Address, actor: &Address) -> bool {
        (self.self_handling && type_ref == actor)
            || self
                .handlers
                .get(type_ref)
                .is_some_and(|set| set.contains(actor))
    }
}

impl AccessControl for HandlerRegistry {
    fn can(&self, actor: &Address, action: Action, resource: &Address) -> bool {
        match action {
            Action::UpdateConditionState => self.is_handler(resource, actor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_handling() {
        let type_ref = Address::derive("escrow-condition");
        let registry = HandlerRegistry::new();
        assert!(registry.can(&type_ref, Action::UpdateConditionState, &type_ref));
        assert!(!registry.can(
            &Address::derive("mallory"),
            Action::UpdateConditionState,
            &type_ref
        ));
    }

    #[test]
    fn test_explicit_registry() {
        let type_ref = Address::derive("sign-condition");
        let handler = Address::derive("sign-handler");
        let mut registry = HandlerRegistry::explicit_only().register(type_ref, handler);

        assert!(registry.can(&handler, Action::UpdateConditionState, &type_ref));
        assert!(!registry.can(&type_ref, Action::UpdateConditionState, &type_ref));

        assert!(registry.unregister(&type_ref, &handler));
        assert!(!registry.unregister(&type_ref, &handler));
        assert!(!registry.can(&handler, Action::UpdateConditionState, &type_ref));
    }

    #[test]
    fn test_closure_access_control() {
        let admin = Address::derive("admin");
        let policy = move |actor: &Address, _: Action, _: &Address| *actor == admin;
        assert!(policy.can(&admin, Action::UpdateConditionState, &Address::ZERO));
        assert!(!policy.can(&Address::ZERO, Action::UpdateConditionState, &Address::ZERO));
    }
}
