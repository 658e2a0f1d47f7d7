//! Attribute access on components.
//!
//! An attribute name is resolved against, in order:
//!
//! 1. the properties declared by the component's class, through their
//!    current value and then their declared default,
//! 2. the dynamic attributes stored in the [`ATTRIBUTES_KEY`] map property,
//! 3. the value bindings stored in the [`BINDINGS_KEY`] map property,
//!    evaluated by the context's [`ExpressionResolver`].
//!
//! A declared property without a value consults its binding before falling
//! back to its default. Every write goes through the component's
//! [`DeltaStateHelper`], so attribute changes are recorded as deltas like
//! any other property change.
//!
//! [`ExpressionResolver`]: crate::context::ExpressionResolver
//! [`DeltaStateHelper`]: crate::state_helper::DeltaStateHelper

use smol_str::SmolStr;
use thiserror::Error;

use crate::class::PropertyKind;
use crate::component::Component;
use crate::context::StateContext;
use crate::state_helper::BINDINGS_KEY;
use crate::value::Value;

/// The map property holding a component's dynamic attributes.
pub const ATTRIBUTES_KEY: &str = "attributes";

/// Where a resolved attribute came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[non_exhaustive]
pub enum AttributeSource {
    /// A property declared by the component's class.
    #[display("property")]
    Property,
    /// A dynamic attribute.
    #[display("attribute")]
    Attribute,
    /// A value binding.
    #[display("binding")]
    Binding,
    /// Nothing matched.
    #[display("missing")]
    Missing,
}

/// The result of [`Component::resolve_attribute`].
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedAttribute {
    /// Where the value came from.
    pub source: AttributeSource,
    /// The value. A declared property without value or default resolves to
    /// `None`.
    pub value: Option<Value>,
}

/// Errors that can occur when writing attributes.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum AttributeError {
    /// Attribute names must not be empty.
    #[error("attribute names must not be empty")]
    EmptyName,
    /// The name is used for the component's own bookkeeping.
    #[error("`{0}` is a reserved attribute name")]
    Reserved(SmolStr),
    /// The value does not match the declared kind of the property.
    #[error("property `{name}` holds {expected:?} values, found a {found} value")]
    WrongKind {
        /// The property.
        name: SmolStr,
        /// Its declared kind.
        expected: PropertyKind,
        /// The kind of the rejected value.
        found: &'static str,
    },
    /// The property cannot take a value binding.
    #[error("property `{0}` does not accept value bindings")]
    LiteralOnly(SmolStr),
}

fn check_name(name: &str) -> Result<(), AttributeError> {
    if name.is_empty() {
        return Err(AttributeError::EmptyName);
    }
    if name == ATTRIBUTES_KEY || name == BINDINGS_KEY {
        return Err(AttributeError::Reserved(name.into()));
    }
    Ok(())
}

impl Component {
    /// Returns the value of an attribute.
    #[must_use]
    pub fn attribute(&self, ctx: &StateContext, name: &str) -> Option<Value> {
        self.resolve_attribute(ctx, name).value
    }

    /// Resolves an attribute and reports where its value came from.
    #[must_use]
    pub fn resolve_attribute(&self, ctx: &StateContext, name: &str) -> ResolvedAttribute {
        let resolved = |source, value| ResolvedAttribute { source, value };
        let binding = || {
            self.value_binding(name)
                .and_then(|expression| ctx.resolve(expression))
        };

        if let Some(property) = self.class().property(name) {
            if let Some(value) = self.get(name) {
                return resolved(AttributeSource::Property, Some(value.clone()));
            }
            if let Some(value) = binding() {
                return resolved(AttributeSource::Binding, Some(value));
            }
            return resolved(AttributeSource::Property, property.default.clone());
        }
        if let Some(value) = self.state().get_entry(ATTRIBUTES_KEY, name) {
            return resolved(AttributeSource::Attribute, Some(value.clone()));
        }
        match binding() {
            Some(value) => resolved(AttributeSource::Binding, Some(value)),
            None => resolved(AttributeSource::Missing, None),
        }
    }

    /// Sets an attribute, returning its previous value.
    ///
    /// Declared properties are set directly after checking their kind. Other
    /// names become dynamic attributes.
    pub fn set_attribute(
        &mut self,
        name: &str,
        value: Value,
    ) -> Result<Option<Value>, AttributeError> {
        check_name(name)?;
        let kind = self.class().property(name).map(|p| p.kind);
        match kind {
            Some(kind) if !kind.admits(&value) => Err(AttributeError::WrongKind {
                name: name.into(),
                expected: kind,
                found: value.kind_name(),
            }),
            Some(_) => Ok(self.state_mut().put(name, value)),
            None => Ok(self.state_mut().put_entry(ATTRIBUTES_KEY, name, value)),
        }
    }

    /// Removes an attribute, returning its value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        check_name(name).ok()?;
        if self.class().property(name).is_some() {
            self.state_mut().remove(name)
        } else {
            self.state_mut().remove_entry(ATTRIBUTES_KEY, name)
        }
    }

    /// Binds an attribute to an expression, returning the previous one.
    pub fn set_value_binding(
        &mut self,
        name: &str,
        expression: impl Into<SmolStr>,
    ) -> Result<Option<SmolStr>, AttributeError> {
        check_name(name)?;
        if self.class().property(name).is_some_and(|p| p.literal_only) {
            return Err(AttributeError::LiteralOnly(name.into()));
        }
        let previous =
            self.state_mut()
                .put_entry(BINDINGS_KEY, name, Value::Str(expression.into()));
        Ok(previous.and_then(|v| v.as_str().map(SmolStr::from)))
    }

    /// Removes the value binding of an attribute.
    pub fn remove_value_binding(&mut self, name: &str) -> Option<SmolStr> {
        check_name(name).ok()?;
        self.state_mut()
            .remove_entry(BINDINGS_KEY, name)
            .and_then(|v| v.as_str().map(SmolStr::from))
    }

    /// The expression an attribute is bound to.
    #[must_use]
    pub fn value_binding(&self, name: &str) -> Option<&str> {
        self.state().get_entry(BINDINGS_KEY, name)?.as_str()
    }
}
