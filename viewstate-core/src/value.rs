//! Dynamic values stored in component property maps.

use std::collections::BTreeMap;

use derive_more::From;
use smol_str::SmolStr;

use crate::holder::AttachedObject;

/// A property value.
///
/// An unset property is represented by the absence of a value, never by a
/// variant of this enum.
#[derive(Clone, Debug, PartialEq, From)]
#[non_exhaustive]
pub enum Value {
    /// A boolean flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(SmolStr),
    /// An ordered collection of values.
    List(Vec<Value>),
    /// A map of named values.
    Map(BTreeMap<SmolStr, Value>),
    /// An object that saves and restores its own state.
    Holder(AttachedObject),
}

impl Value {
    /// A short name for the kind of value, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Holder(_) => "holder",
        }
    }

    /// Returns an empty list value.
    #[must_use]
    pub fn empty_list() -> Self {
        Value::List(Vec::new())
    }

    /// Returns an empty map value.
    #[must_use]
    pub fn empty_map() -> Self {
        Value::Map(BTreeMap::new())
    }

    /// Returns the boolean, if this is a [`Value::Bool`].
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is a [`Value::Int`].
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string, if this is a [`Value::Str`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements, if this is a [`Value::List`].
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the elements mutably, if this is a [`Value::List`].
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the entries, if this is a [`Value::Map`].
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<SmolStr, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Returns the entries mutably, if this is a [`Value::Map`].
    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<SmolStr, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Returns the attached object, if this is a [`Value::Holder`].
    #[must_use]
    pub fn as_holder(&self) -> Option<&AttachedObject> {
        match self {
            Value::Holder(h) => Some(h),
            _ => None,
        }
    }

    /// Returns the attached object mutably, if this is a [`Value::Holder`].
    pub fn as_holder_mut(&mut self) -> Option<&mut AttachedObject> {
        match self {
            Value::Holder(h) => Some(h),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i.into())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::Value;
    use proptest::collection::{btree_map, vec};
    use proptest::prelude::*;
    use rstest::rstest;
    use smol_str::SmolStr;

    /// Arbitrary plain values, without attached holders.
    pub(crate) fn any_plain_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            "[a-z]{0,6}".prop_map(Value::from),
        ];
        leaf.prop_recursive(2, 12, 4, |inner| {
            prop_oneof![
                vec(inner.clone(), 0..4).prop_map(Value::List),
                btree_map("[a-z]{1,3}".prop_map(SmolStr::from), inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    #[rstest]
    #[case(Value::from(true), "bool")]
    #[case(Value::from(3), "int")]
    #[case(Value::from(0.5), "float")]
    #[case(Value::from("x"), "string")]
    #[case(Value::empty_list(), "list")]
    #[case(Value::empty_map(), "map")]
    fn kind_names(#[case] value: Value, #[case] name: &str) {
        assert_eq!(value.kind_name(), name);
    }

    #[test]
    fn accessors() {
        let mut list = Value::List(vec![1.into()]);
        list.as_list_mut().unwrap().push(2.into());
        assert_eq!(list.as_list(), Some(&[Value::Int(1), Value::Int(2)][..]));
        assert_eq!(list.as_map(), None);
        assert_eq!(Value::from("on").as_str(), Some("on"));
        assert_eq!(Value::from(false).as_bool(), Some(false));
        assert_eq!(Value::from(7).as_int(), Some(7));
    }
}
