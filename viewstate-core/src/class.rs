//! Component class metadata.
//!
//! A [`ComponentClass`] declares the properties a kind of component knows
//! about: their defaults, their kind, and whether they take part in the
//! baseline comparison that keeps unchanged values out of saved deltas.
//!
//! Classes are usually obtained through [`class_of`], which describes each
//! [`ComponentType`] once per process and hands out shared copies after
//! that.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use smol_str::SmolStr;

use crate::array_map::ArrayMap;
use crate::state_helper::PropertyKey;
use crate::value::Value;

/// The shape of a declared property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PropertyKind {
    /// A single value.
    #[default]
    Scalar,
    /// A [`Value::List`], changed element by element.
    List,
    /// A [`Value::Map`], changed entry by entry.
    Map,
}

impl PropertyKind {
    /// Returns `true` if `value` has this kind.
    #[must_use]
    pub fn admits(self, value: &Value) -> bool {
        match self {
            PropertyKind::Scalar => true,
            PropertyKind::List => matches!(value, Value::List(_)),
            PropertyKind::Map => matches!(value, Value::Map(_)),
        }
    }
}

/// A property declared by a component class.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescriptor {
    /// The property name.
    pub name: PropertyKey,
    /// The value reported while the property is unset.
    pub default: Option<Value>,
    /// The shape of the property's values.
    pub kind: PropertyKind,
    /// Literal-only properties cannot take a value binding.
    pub literal_only: bool,
    /// Tracked properties are compared against their baseline value when
    /// saving deltas.
    pub tracked: bool,
}

impl PropertyDescriptor {
    /// Declares a scalar property without a default.
    pub fn new(name: impl Into<PropertyKey>) -> Self {
        Self {
            name: name.into(),
            default: None,
            kind: PropertyKind::Scalar,
            literal_only: false,
            tracked: false,
        }
    }

    /// Declares a list property.
    pub fn list(name: impl Into<PropertyKey>) -> Self {
        Self {
            kind: PropertyKind::List,
            ..Self::new(name)
        }
    }

    /// Declares a map property.
    pub fn map(name: impl Into<PropertyKey>) -> Self {
        Self {
            kind: PropertyKind::Map,
            ..Self::new(name)
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Refuses value bindings for this property.
    #[must_use]
    pub fn literal_only(mut self) -> Self {
        self.literal_only = true;
        self
    }

    /// Compares the property against its baseline when saving deltas.
    #[must_use]
    pub fn tracked(mut self) -> Self {
        self.tracked = true;
        self
    }
}

/// The declared properties of a kind of component.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComponentClass {
    family: SmolStr,
    properties: ArrayMap<PropertyKey, PropertyDescriptor>,
}

impl ComponentClass {
    /// Creates a class without properties.
    pub fn new(family: impl Into<SmolStr>) -> Self {
        Self {
            family: family.into(),
            properties: ArrayMap::new(),
        }
    }

    /// Declares a property, replacing an earlier declaration of the same name.
    #[must_use]
    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.insert(property.name.clone(), property);
        self
    }

    /// The component family, such as `"input"`.
    #[must_use]
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Returns a declared property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    /// Iterates over the declared properties in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    /// The tracked properties with their defaults.
    pub fn tracked_defaults(&self) -> impl Iterator<Item = (PropertyKey, Option<Value>)> + '_ {
        self.properties()
            .filter(|p| p.tracked)
            .map(|p| (p.name.clone(), p.default.clone()))
    }
}

/// A Rust type standing for a kind of component.
pub trait ComponentType: 'static {
    /// Declares the class. Called at most once per process, by [`class_of`].
    fn describe() -> ComponentClass;
}

/// Process-wide cache of described classes. Entries are never evicted.
static CLASSES: LazyLock<RwLock<HashMap<TypeId, Arc<ComponentClass>>>> =
    LazyLock::new(Default::default);

/// Returns the class of a component type, describing it on first use.
///
/// Lookups of known types only take the read lock. Describing a new type
/// happens outside the lock; if two threads race, the first class written
/// wins and both get it.
pub fn class_of<T: ComponentType>() -> Arc<ComponentClass> {
    let id = TypeId::of::<T>();
    if let Some(class) = CLASSES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
    {
        return class.clone();
    }
    let described = Arc::new(T::describe());
    CLASSES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(id)
        .or_insert(described)
        .clone()
}
