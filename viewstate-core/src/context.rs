//! Request-scoped collaborators used while saving, restoring and evaluating
//! component state.

use std::collections::HashMap;

use crate::holder::HolderRegistry;
use crate::value::Value;

/// Resolves value binding expressions.
///
/// Bindings are stored on components as plain expression strings. Their
/// evaluation is left to the surrounding application.
pub trait ExpressionResolver {
    /// Evaluates an expression, returning `None` if it does not resolve.
    fn resolve(&self, expression: &str) -> Option<Value>;
}

/// A resolver that resolves nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoExpressions;

impl ExpressionResolver for NoExpressions {
    fn resolve(&self, _expression: &str) -> Option<Value> {
        None
    }
}

/// Resolves expressions by their exact text.
impl ExpressionResolver for HashMap<String, Value> {
    fn resolve(&self, expression: &str) -> Option<Value> {
        self.get(expression).cloned()
    }
}

/// What saving and restoring state needs from the current request.
pub struct StateContext {
    registry: HolderRegistry,
    resolver: Box<dyn ExpressionResolver>,
}

impl StateContext {
    /// Creates a context that resolves no expressions.
    #[must_use]
    pub fn new(registry: HolderRegistry) -> Self {
        Self {
            registry,
            resolver: Box::new(NoExpressions),
        }
    }

    /// Replaces the expression resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl ExpressionResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// The holder types known to this context.
    #[must_use]
    pub fn registry(&self) -> &HolderRegistry {
        &self.registry
    }

    /// The holder types known to this context, mutably.
    pub fn registry_mut(&mut self) -> &mut HolderRegistry {
        &mut self.registry
    }

    /// Evaluates a value binding expression.
    #[must_use]
    pub fn resolve(&self, expression: &str) -> Option<Value> {
        self.resolver.resolve(expression)
    }
}

impl Default for StateContext {
    fn default() -> Self {
        Self::new(HolderRegistry::default())
    }
}

impl std::fmt::Debug for StateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateContext")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
