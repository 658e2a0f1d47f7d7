//! Differential state saving for trees of stateful UI components.
//!
//! A [`ComponentTree`] owns a set of [`Component`]s connected through
//! ordered children lists and named facet slots. Every component keeps its
//! properties in a [`DeltaStateHelper`], which records changes relative to a
//! baseline once the component's initial state has been marked. Saving a
//! marked tree then only serializes what changed during the request, and
//! restoring those deltas onto a tree rebuilt to the same baseline
//! reproduces the mutated state.
//!
//! The serialized form is described in [`saved`].

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod array_map;
pub mod attached;
pub mod attributes;
pub mod class;
pub mod component;
pub mod context;
pub mod core;
pub mod delta_list;
pub mod holder;
pub(crate) mod macros;
pub mod saved;
pub mod state_helper;
pub mod std_components;
pub mod tree;
pub mod value;

pub use crate::array_map::ArrayMap;
pub use crate::attributes::{AttributeError, AttributeSource, ResolvedAttribute};
pub use crate::class::{ComponentClass, ComponentType, PropertyDescriptor, PropertyKind, class_of};
pub use crate::component::{Component, ResetMode};
pub use crate::context::{ExpressionResolver, NoExpressions, StateContext};
pub use crate::core::Node;
pub use crate::delta_list::DeltaList;
pub use crate::holder::{AttachedObject, HolderRegistry, StateHolder};
pub use crate::saved::{NodeState, RestoreError, SavedProperties, SavedValue, TreeState};
pub use crate::state_helper::{DeltaStateHelper, PropertyKey};
pub use crate::tree::{ComponentTree, TreeError, TreeEvent};
pub use crate::value::Value;
