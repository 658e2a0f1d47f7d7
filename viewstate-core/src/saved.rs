//! The serialized form of component state.
//!
//! Saving a component produces a [`NodeState`]. Its properties are stored as
//! a flat, even-length `[key0, value0, key1, value1, ..]` sequence (see
//! [`SavedProperties`]) whose entries are replayed in order when restoring.
//! Saving a subtree produces a [`TreeState`], which nests the states of
//! facets by name and of children by position.
//!
//! The format carries no version. It is only meant to be read back by the
//! same build that wrote it.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::{Error as _, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smol_str::SmolStr;
use thiserror::Error;

/// A saved value.
///
/// Besides plain literals this includes the markers used by delta state:
/// deletions, list and map changes, and the nested deltas of holders that
/// track their own changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SavedValue {
    /// In a property sequence: the property was removed since the baseline.
    /// In a list of element deltas: the element did not change.
    Null,
    /// A boolean flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(SmolStr),
    /// A list of values.
    List(Vec<SavedValue>),
    /// A map of named values, in key order.
    Map(Vec<(SmolStr, SavedValue)>),
    /// The full state of a holder, with the name of its type.
    Attached {
        /// The registered type name of the holder.
        ty: SmolStr,
        /// The holder's own saved state.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<Box<SavedValue>>,
    },
    /// The changes of a holder that is already present where the state is
    /// restored.
    AttachedDelta {
        /// The registered type name of the holder.
        ty: SmolStr,
        /// The holder's saved changes.
        state: Box<SavedValue>,
    },
    /// Elements added to (`true`) or removed from (`false`) a list property.
    ListChanges(Vec<(SavedValue, bool)>),
    /// Entries put into a map property. A [`SavedValue::Null`] entry was
    /// removed.
    MapChanges(Vec<(SmolStr, SavedValue)>),
    /// Positional element deltas of a delta-aware list.
    Elements(Vec<SavedValue>),
}

impl SavedValue {
    /// A short name for the kind of value, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            SavedValue::Null => "null",
            SavedValue::Bool(_) => "bool",
            SavedValue::Int(_) => "int",
            SavedValue::Float(_) => "float",
            SavedValue::Str(_) => "string",
            SavedValue::List(_) => "list",
            SavedValue::Map(_) => "map",
            SavedValue::Attached { .. } => "attached",
            SavedValue::AttachedDelta { .. } => "attached delta",
            SavedValue::ListChanges(_) => "list changes",
            SavedValue::MapChanges(_) => "map changes",
            SavedValue::Elements(_) => "element deltas",
        }
    }

    /// Returns `true` for values that only make sense relative to a baseline.
    #[must_use]
    pub fn is_delta_marker(&self) -> bool {
        matches!(
            self,
            SavedValue::Null
                | SavedValue::AttachedDelta { .. }
                | SavedValue::ListChanges(_)
                | SavedValue::MapChanges(_)
                | SavedValue::Elements(_)
        )
    }

    /// Calls `f` with the type name of every holder saved in this value.
    fn visit_holder_types(&self, f: &mut impl FnMut(&SmolStr)) {
        match self {
            SavedValue::Attached { ty, state } => {
                f(ty);
                if let Some(state) = state {
                    state.visit_holder_types(f);
                }
            }
            SavedValue::AttachedDelta { ty, state } => {
                f(ty);
                state.visit_holder_types(f);
            }
            SavedValue::List(items) | SavedValue::Elements(items) => {
                items.iter().for_each(|v| v.visit_holder_types(f));
            }
            SavedValue::Map(entries) | SavedValue::MapChanges(entries) => {
                entries.iter().for_each(|(_, v)| v.visit_holder_types(f));
            }
            SavedValue::ListChanges(changes) => {
                changes.iter().for_each(|(v, _)| v.visit_holder_types(f));
            }
            SavedValue::Null
            | SavedValue::Bool(_)
            | SavedValue::Int(_)
            | SavedValue::Float(_)
            | SavedValue::Str(_) => {}
        }
    }
}

/// A flat sequence of saved properties.
///
/// Serialized as `[key0, value0, key1, value1, ..]`. Keys are unique and
/// keep the order in which they were pushed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SavedProperties(Vec<(SmolStr, SavedValue)>);

impl SavedProperties {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends a property, replacing the value of an existing key in place.
    pub fn push(&mut self, key: impl Into<SmolStr>, value: SavedValue) -> Option<SavedValue> {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => Some(std::mem::replace(v, value)),
            None => {
                self.0.push((key, value));
                None
            }
        }
    }

    /// Returns the saved value of a property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SavedValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns `true` if the sequence holds a property.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over the properties in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&SmolStr, &SavedValue)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    /// Iterates over the property keys in order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &SmolStr> {
        self.0.iter().map(|(k, _)| k)
    }

    /// Iterates over the saved values in order.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &SavedValue> {
        self.0.iter().map(|(_, v)| v)
    }
}

impl FromIterator<(SmolStr, SavedValue)> for SavedProperties {
    fn from_iter<I: IntoIterator<Item = (SmolStr, SavedValue)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (k, v) in iter {
            props.push(k, v);
        }
        props
    }
}

impl IntoIterator for SavedProperties {
    type Item = (SmolStr, SavedValue);
    type IntoIter = std::vec::IntoIter<(SmolStr, SavedValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for SavedProperties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(untagged)]
        enum Item<'a> {
            Key(&'a str),
            Value(&'a SavedValue),
        }

        let mut seq = serializer.serialize_seq(Some(self.0.len() * 2))?;
        for (k, v) in &self.0 {
            seq.serialize_element(&Item::Key(k))?;
            seq.serialize_element(&Item::Value(v))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SavedProperties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PropertiesVisitor;

        impl<'de> Visitor<'de> for PropertiesVisitor {
            type Value = SavedProperties;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an even-length sequence of property keys and values")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut props = Vec::with_capacity(seq.size_hint().unwrap_or(0) / 2);
                while let Some(key) = seq.next_element::<SmolStr>()? {
                    let Some(value) = seq.next_element::<SavedValue>()? else {
                        return Err(A::Error::invalid_length(props.len() * 2 + 1, &self));
                    };
                    if props.iter().any(|(k, _)| *k == key) {
                        return Err(A::Error::custom(format_args!(
                            "duplicate property key `{key}`"
                        )));
                    }
                    props.push((key, value));
                }
                Ok(SavedProperties(props))
            }
        }

        deserializer.deserialize_seq(PropertiesVisitor)
    }
}

/// The saved state of a single component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NodeState {
    /// Changes since the component's baseline was marked.
    Delta {
        /// The saved attached listeners, if they changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        listeners: Option<SavedValue>,
        /// The changed properties, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<SavedProperties>,
    },
    /// The complete state of a component without a marked baseline.
    Full {
        /// The component's id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SmolStr>,
        /// The saved attached listeners. Absent when there are none.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        listeners: Option<SavedValue>,
        /// Every property of the component.
        #[serde(default)]
        properties: SavedProperties,
    },
}

impl NodeState {
    /// Returns `true` for [`NodeState::Delta`].
    #[must_use]
    pub fn is_delta(&self) -> bool {
        matches!(self, NodeState::Delta { .. })
    }

    /// The saved properties, if any.
    #[must_use]
    pub fn properties(&self) -> Option<&SavedProperties> {
        match self {
            NodeState::Delta { properties, .. } => properties.as_ref(),
            NodeState::Full { properties, .. } => Some(properties),
        }
    }

    /// The saved listeners, if any.
    #[must_use]
    pub fn listeners(&self) -> Option<&SavedValue> {
        match self {
            NodeState::Delta { listeners, .. } | NodeState::Full { listeners, .. } => {
                listeners.as_ref()
            }
        }
    }

    fn validate(&self) -> Result<(), InvalidState> {
        match self {
            NodeState::Delta { listeners, .. } => match listeners {
                None | Some(SavedValue::List(_) | SavedValue::Elements(_)) => Ok(()),
                Some(other) => Err(InvalidState::InvalidListeners {
                    found: other.kind_name(),
                }),
            },
            NodeState::Full {
                listeners,
                properties,
                ..
            } => {
                match listeners {
                    None | Some(SavedValue::List(_)) => {}
                    Some(SavedValue::Elements(_)) => {
                        return Err(InvalidState::ListenerDeltasInFullState);
                    }
                    Some(other) => {
                        return Err(InvalidState::InvalidListeners {
                            found: other.kind_name(),
                        });
                    }
                }
                match properties.iter().find(|(_, v)| v.is_delta_marker()) {
                    Some((key, v)) => Err(InvalidState::DeltaMarkerInFullState {
                        key: key.clone(),
                        marker: v.kind_name(),
                    }),
                    None => Ok(()),
                }
            }
        }
    }
}

/// The saved state of a component subtree.
///
/// Facets are keyed by name, children are positional. Transient components
/// do not appear at all, so `children` only lines up with the non-transient
/// children of the restored component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeState {
    /// The component's own state. `None` when a marked component is unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NodeState>,
    /// The state of each facet, by facet name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facets: BTreeMap<SmolStr, TreeState>,
    /// The state of each non-transient child, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeState>,
}

impl TreeState {
    /// Checks that every node state in the subtree is well formed.
    pub fn validate(&self) -> Result<(), StateValidationError> {
        self.validate_at("")
    }

    fn validate_at(&self, path: &str) -> Result<(), StateValidationError> {
        if let Some(state) = &self.state {
            state.validate().map_err(|kind| StateValidationError {
                path: if path.is_empty() {
                    "/".to_string()
                } else {
                    path.to_string()
                },
                kind,
            })?;
        }
        for (name, facet) in &self.facets {
            facet.validate_at(&format!("{path}/facets/{name}"))?;
        }
        for (i, child) in self.children.iter().enumerate() {
            child.validate_at(&format!("{path}/children/{i}"))?;
        }
        Ok(())
    }

    /// Counts what the subtree state holds.
    #[must_use]
    pub fn summary(&self) -> StateSummary {
        let mut summary = StateSummary::default();
        self.summarize(&mut summary);
        summary
    }

    fn summarize(&self, summary: &mut StateSummary) {
        summary.nodes += 1;
        match &self.state {
            None => summary.unchanged_nodes += 1,
            Some(state) => {
                if state.is_delta() {
                    summary.delta_nodes += 1;
                } else {
                    summary.full_nodes += 1;
                }
                if let Some(props) = state.properties() {
                    summary.properties += props.len();
                    summary.deletions += props
                        .values()
                        .filter(|v| matches!(v, SavedValue::Null))
                        .count();
                    for v in props.values() {
                        v.visit_holder_types(&mut |ty| {
                            summary.holder_types.insert(ty.clone());
                        });
                    }
                }
                if let Some(listeners) = state.listeners() {
                    listeners.visit_holder_types(&mut |ty| {
                        summary.holder_types.insert(ty.clone());
                    });
                }
            }
        }
        summary.facets += self.facets.len();
        for facet in self.facets.values() {
            facet.summarize(summary);
        }
        for child in &self.children {
            child.summarize(summary);
        }
    }
}

/// What a [`TreeState`] holds, as counted by [`TreeState::summary`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSummary {
    /// Saved nodes, including unchanged ones.
    pub nodes: usize,
    /// Nodes saved in full.
    pub full_nodes: usize,
    /// Nodes saved as deltas.
    pub delta_nodes: usize,
    /// Marked nodes without changes.
    pub unchanged_nodes: usize,
    /// Facet slots.
    pub facets: usize,
    /// Saved property entries.
    pub properties: usize,
    /// Property entries marking a removal.
    pub deletions: usize,
    /// The holder types referenced anywhere in the state.
    pub holder_types: BTreeSet<SmolStr>,
}

/// A malformed [`TreeState`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid state at {path}: {kind}")]
pub struct StateValidationError {
    /// The path of the offending node, such as `/children/0/facets/header`.
    pub path: String,
    /// What is wrong with the node's state.
    pub kind: InvalidState,
}

/// The ways a single node state can be malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InvalidState {
    /// A full state holds a value that only makes sense relative to a baseline.
    #[error("full state holds a {marker} marker for property `{key}`")]
    DeltaMarkerInFullState {
        /// The property holding the marker.
        key: SmolStr,
        /// The kind of marker.
        marker: &'static str,
    },
    /// A full state holds positional listener deltas.
    #[error("full state holds listener element deltas")]
    ListenerDeltasInFullState,
    /// Listener state is neither a list nor element deltas.
    #[error("listener state must be a list or element deltas, found {found}")]
    InvalidListeners {
        /// The kind of value found.
        found: &'static str,
    },
}

/// Errors that can occur while restoring saved state.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum RestoreError {
    /// No holder type is registered under the saved name.
    #[error("unknown state holder type `{0}`")]
    UnknownHolderType(SmolStr),
    /// A saved value does not have the expected shape.
    #[error("expected {expected}, found {found}")]
    UnexpectedShape {
        /// What the restoring side expected.
        expected: &'static str,
        /// What the state held.
        found: &'static str,
    },
    /// A holder delta does not match the value it should be applied to.
    #[error("cannot apply a delta of `{ty}` to {found}")]
    DeltaTargetMismatch {
        /// The holder type the delta was saved from.
        ty: SmolStr,
        /// What the restoring side holds instead.
        found: String,
    },
    /// An element delta refers to a position past the end of the list.
    #[error("element delta at index {index} is out of range for a list of length {len}")]
    ElementOutOfRange {
        /// The position of the delta.
        index: usize,
        /// The length of the list.
        len: usize,
    },
    /// A component without a marked baseline has no saved state.
    #[error("missing state for a component without a marked baseline")]
    MissingState,
    /// The number of saved children differs from the restoring subtree.
    #[error("saved state has {saved} children but the component has {present}")]
    ChildCountMismatch {
        /// Saved child states.
        saved: usize,
        /// Non-transient children of the component.
        present: usize,
    },
    /// Restoring a property failed.
    #[error("cannot restore property `{key}`: {source}")]
    Property {
        /// The property being restored.
        key: SmolStr,
        /// The underlying failure.
        source: Box<RestoreError>,
    },
}

impl RestoreError {
    /// An [`RestoreError::UnexpectedShape`] for a saved value.
    #[must_use]
    pub fn unexpected(expected: &'static str, found: &SavedValue) -> Self {
        RestoreError::UnexpectedShape {
            expected,
            found: found.kind_name(),
        }
    }

    pub(crate) fn in_property(self, key: &SmolStr) -> Self {
        RestoreError::Property {
            key: key.clone(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn props(entries: impl IntoIterator<Item = (&'static str, SavedValue)>) -> SavedProperties {
        entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
    }

    #[test]
    fn properties_serialize_flat() {
        let p = props([
            ("value", SavedValue::Str("B".into())),
            ("title", SavedValue::Null),
        ]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(
            json,
            json!(["value", {"t": "str", "v": "B"}, "title", {"t": "null"}])
        );
        let back: SavedProperties = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[rstest]
    #[case::odd_length(json!(["value", {"t": "int", "v": 1}, "dangling"]), "invalid length 3")]
    #[case::non_string_key(json!([1, {"t": "int", "v": 1}]), "invalid type")]
    #[case::duplicate_key(
        json!(["a", {"t": "int", "v": 1}, "a", {"t": "int", "v": 2}]),
        "duplicate property key `a`"
    )]
    fn malformed_properties(#[case] json: serde_json::Value, #[case] message: &str) {
        let err = serde_json::from_value::<SavedProperties>(json).unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }

    #[rstest]
    #[case::nested_properties(json!({"t": "properties", "v": ["a", {"t": "int", "v": 1}]}))]
    #[case::untagged(json!({"v": 1}))]
    fn unknown_value_tags(#[case] json: serde_json::Value) {
        assert!(serde_json::from_value::<SavedValue>(json).is_err());
    }

    #[test]
    fn push_replaces_in_place() {
        let mut p = props([("a", SavedValue::Int(1)), ("b", SavedValue::Int(2))]);
        assert_eq!(p.push("a", SavedValue::Int(3)), Some(SavedValue::Int(1)));
        assert_eq!(p.keys().map(|k| k.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(p.get("a"), Some(&SavedValue::Int(3)));
    }

    #[test]
    fn tree_state_roundtrip() {
        let state = TreeState {
            state: Some(NodeState::Full {
                id: Some("form".into()),
                listeners: Some(SavedValue::List(vec![SavedValue::Attached {
                    ty: "tag".into(),
                    state: Some(Box::new(SavedValue::Str("x".into()))),
                }])),
                properties: props([("rendered", SavedValue::Bool(true))]),
            }),
            facets: BTreeMap::from([(
                "header".into(),
                TreeState {
                    state: Some(NodeState::Delta {
                        listeners: None,
                        properties: Some(props([(
                            "counter",
                            SavedValue::AttachedDelta {
                                ty: "counter".into(),
                                state: Box::new(SavedValue::Int(2)),
                            },
                        )])),
                    }),
                    ..TreeState::default()
                },
            )]),
            children: vec![TreeState::default()],
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: TreeState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn validate_reports_path() {
        let bad = TreeState {
            state: Some(NodeState::Full {
                id: None,
                listeners: None,
                properties: props([("value", SavedValue::Null)]),
            }),
            ..TreeState::default()
        };
        let tree = TreeState {
            children: vec![
                TreeState::default(),
                TreeState {
                    facets: BTreeMap::from([("header".into(), bad)]),
                    ..TreeState::default()
                },
            ],
            ..TreeState::default()
        };
        let err = tree.validate().unwrap_err();
        assert_eq!(err.path, "/children/1/facets/header");
        assert_eq!(
            err.kind,
            InvalidState::DeltaMarkerInFullState {
                key: "value".into(),
                marker: "null"
            }
        );
    }

    #[rstest]
    #[case(NodeState::Delta { listeners: Some(SavedValue::Elements(vec![])), properties: None }, true)]
    #[case(NodeState::Delta { listeners: Some(SavedValue::Int(1)), properties: None }, false)]
    #[case(NodeState::Full { id: None, listeners: Some(SavedValue::Elements(vec![])), properties: SavedProperties::new() }, false)]
    #[case(NodeState::Full { id: None, listeners: Some(SavedValue::List(vec![])), properties: SavedProperties::new() }, true)]
    fn validate_listeners(#[case] state: NodeState, #[case] valid: bool) {
        let tree = TreeState {
            state: Some(state),
            ..TreeState::default()
        };
        assert_eq!(tree.validate().is_ok(), valid);
    }

    #[test]
    fn summary_counts() {
        let tree = TreeState {
            state: Some(NodeState::Delta {
                listeners: None,
                properties: Some(props([
                    ("title", SavedValue::Null),
                    (
                        "styles",
                        SavedValue::ListChanges(vec![(
                            SavedValue::Attached {
                                ty: "tag".into(),
                                state: None,
                            },
                            true,
                        )]),
                    ),
                ])),
            }),
            facets: BTreeMap::from([("footer".into(), TreeState::default())]),
            children: vec![TreeState {
                state: Some(NodeState::Full {
                    id: None,
                    listeners: None,
                    properties: props([("value", SavedValue::Int(1))]),
                }),
                ..TreeState::default()
            }],
        };
        let summary = tree.summary();
        assert_eq!(summary.nodes, 3);
        assert_eq!(summary.delta_nodes, 1);
        assert_eq!(summary.full_nodes, 1);
        assert_eq!(summary.unchanged_nodes, 1);
        assert_eq!(summary.facets, 1);
        assert_eq!(summary.properties, 3);
        assert_eq!(summary.deletions, 1);
        assert_eq!(
            summary.holder_types.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            ["tag"]
        );
    }
}
