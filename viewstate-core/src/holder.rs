//! Values that save and restore their own state.
//!
//! A [`StateHolder`] is stored inside a property map as a [`Value::Holder`].
//! When the map is saved the holder is asked for its own state, which is
//! wrapped together with the holder's type name. Restoring the wrapper
//! re-instantiates the holder through a [`HolderRegistry`] before handing
//! the nested state back to it.
//!
//! Holders may additionally track their own changes relative to a baseline
//! (see [`StateHolder::mark_initial_state`]). Once marked, such a holder
//! only saves what changed since it was marked.
//!
//! [`Value::Holder`]: crate::Value::Holder

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use downcast_rs::{Downcast, impl_downcast};
use smol_str::SmolStr;

use crate::context::StateContext;
use crate::macros::impl_box_clone;
use crate::saved::{RestoreError, SavedValue};

/// An object that knows how to save and restore its own state.
///
/// Implementations are identified by [`StateHolder::type_name`], which must
/// match the name they are registered under in a [`HolderRegistry`].
pub trait StateHolder: Send + Sync + std::fmt::Debug + HolderBoxClone + Any + Downcast {
    /// The name this holder type is registered under.
    fn type_name(&self) -> SmolStr;

    /// Saves the holder's state.
    ///
    /// A holder whose initial state is marked returns only its changes since
    /// it was marked, or `None` if there are none.
    fn save_state(&self, ctx: &StateContext) -> Option<SavedValue>;

    /// Restores state produced by [`StateHolder::save_state`].
    fn restore_state(
        &mut self,
        ctx: &StateContext,
        state: Option<&SavedValue>,
    ) -> Result<(), RestoreError>;

    /// Transient holders are never saved.
    fn is_transient(&self) -> bool {
        false
    }

    /// Compare two holders for equality, using downcasting and comparing the definitions.
    ///
    /// If the type implements `PartialEq`, use [`downcast_equal_holders`] to compare the values.
    ///
    /// It is permissible to return `false` if in doubt. Equal holders let an
    /// unchanged property be left out of the saved deltas.
    fn equal_holders(&self, _other: &dyn StateHolder) -> bool {
        // false unless overridden
        false
    }

    /// Returns `true` if the holder is tracking changes against a baseline.
    fn initial_state_marked(&self) -> bool {
        false
    }

    /// Marks the current state as the holder's baseline.
    fn mark_initial_state(&mut self) {}

    /// Stops tracking changes, so the next save is a full one.
    fn clear_initial_state(&mut self) {}
}

impl_downcast!(StateHolder);
impl_box_clone!(StateHolder, HolderBoxClone);

impl PartialEq for dyn StateHolder {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.equal_holders(other)
    }
}

/// Holder equality for types that have `PartialEq`.
pub fn downcast_equal_holders<T: StateHolder + PartialEq>(
    holder: &T,
    other: &dyn StateHolder,
) -> bool {
    if let Some(other) = other.as_any().downcast_ref::<T>() {
        holder == other
    } else {
        false
    }
}

/// An owned [`StateHolder`] stored as a property value.
#[derive(Clone, Debug)]
pub struct AttachedObject(Box<dyn StateHolder>);

impl AttachedObject {
    /// Wraps a holder.
    pub fn new(holder: impl StateHolder) -> Self {
        Self(Box::new(holder))
    }

    /// Wraps a boxed holder.
    #[must_use]
    pub fn from_box(holder: Box<dyn StateHolder>) -> Self {
        Self(holder)
    }

    /// The name of the holder's type.
    #[must_use]
    pub fn type_name(&self) -> SmolStr {
        self.0.type_name()
    }

    /// Returns the wrapped holder.
    #[must_use]
    pub fn get(&self) -> &dyn StateHolder {
        self.0.as_ref()
    }

    /// Returns the wrapped holder mutably.
    pub fn get_mut(&mut self) -> &mut dyn StateHolder {
        self.0.as_mut()
    }

    /// Downcasts the holder to a concrete type.
    #[must_use]
    pub fn downcast_ref<T: StateHolder>(&self) -> Option<&T> {
        self.get().as_any().downcast_ref()
    }

    /// Downcasts the holder to a concrete type, mutably.
    pub fn downcast_mut<T: StateHolder>(&mut self) -> Option<&mut T> {
        self.get_mut().as_any_mut().downcast_mut()
    }

    /// Unwraps the boxed holder.
    #[must_use]
    pub fn into_inner(self) -> Box<dyn StateHolder> {
        self.0
    }
}

impl PartialEq for AttachedObject {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl<T: StateHolder> From<T> for AttachedObject {
    fn from(holder: T) -> Self {
        Self::new(holder)
    }
}

/// A factory creating a holder in its default state.
pub type HolderFactory = Arc<dyn Fn() -> Box<dyn StateHolder> + Send + Sync>;

/// The set of holder types that can be restored from saved state.
#[derive(Clone, Default)]
pub struct HolderRegistry {
    factories: HashMap<SmolStr, HolderFactory>,
}

impl HolderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a type name, returning the factory it replaced.
    pub fn register(
        &mut self,
        name: impl Into<SmolStr>,
        factory: impl Fn() -> Box<dyn StateHolder> + Send + Sync + 'static,
    ) -> Option<HolderFactory> {
        self.factories.insert(name.into(), Arc::new(factory))
    }

    /// Registers a holder type under the name its default value reports.
    pub fn register_default<T: StateHolder + Default>(&mut self) -> Option<HolderFactory> {
        let name = T::default().type_name();
        self.register(name, || Box::new(T::default()))
    }

    /// Returns `true` if a factory is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// The registered type names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.factories.keys()
    }

    /// Creates a holder of the named type in its default state.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn StateHolder>, RestoreError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RestoreError::UnknownHolderType(name.into()))?;
        Ok(factory())
    }
}

impl std::fmt::Debug for HolderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("HolderRegistry")
            .field("types", &names)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use rstest::{fixture, rstest};
    use smol_str::SmolStr;

    use super::{AttachedObject, HolderRegistry, StateHolder, downcast_equal_holders};
    use crate::context::StateContext;
    use crate::saved::{RestoreError, SavedValue};

    /// A holder that tracks changes to a counter once marked.
    #[derive(Clone, Debug, Default)]
    pub(crate) struct Counter {
        pub(crate) count: i64,
        marked: bool,
        dirty: bool,
    }

    impl Counter {
        pub(crate) fn new(count: i64) -> Self {
            Self {
                count,
                ..Self::default()
            }
        }

        pub(crate) fn increment(&mut self) {
            self.count += 1;
            self.dirty = true;
        }
    }

    impl PartialEq for Counter {
        fn eq(&self, other: &Self) -> bool {
            self.count == other.count
        }
    }

    impl StateHolder for Counter {
        fn type_name(&self) -> SmolStr {
            "counter".into()
        }

        fn save_state(&self, _ctx: &StateContext) -> Option<SavedValue> {
            (!self.marked || self.dirty).then_some(SavedValue::Int(self.count))
        }

        fn restore_state(
            &mut self,
            _ctx: &StateContext,
            state: Option<&SavedValue>,
        ) -> Result<(), RestoreError> {
            match state {
                None => Ok(()),
                Some(SavedValue::Int(count)) => {
                    self.count = *count;
                    self.dirty = self.marked;
                    Ok(())
                }
                Some(other) => Err(RestoreError::unexpected("int", other)),
            }
        }

        fn equal_holders(&self, other: &dyn StateHolder) -> bool {
            downcast_equal_holders(self, other)
        }

        fn initial_state_marked(&self) -> bool {
            self.marked
        }

        fn mark_initial_state(&mut self) {
            self.marked = true;
            self.dirty = false;
        }

        fn clear_initial_state(&mut self) {
            self.marked = false;
        }
    }

    /// A holder without change tracking.
    #[derive(Clone, Debug, Default, PartialEq)]
    pub(crate) struct Tag(pub(crate) SmolStr);

    impl StateHolder for Tag {
        fn type_name(&self) -> SmolStr {
            "tag".into()
        }

        fn save_state(&self, _ctx: &StateContext) -> Option<SavedValue> {
            Some(SavedValue::Str(self.0.clone()))
        }

        fn restore_state(
            &mut self,
            _ctx: &StateContext,
            state: Option<&SavedValue>,
        ) -> Result<(), RestoreError> {
            match state {
                Some(SavedValue::Str(s)) => {
                    self.0 = s.clone();
                    Ok(())
                }
                None => Ok(()),
                Some(other) => Err(RestoreError::unexpected("string", other)),
            }
        }

        fn equal_holders(&self, other: &dyn StateHolder) -> bool {
            downcast_equal_holders(self, other)
        }
    }

    /// A holder that is never saved.
    #[derive(Clone, Debug, Default)]
    pub(crate) struct Scratch;

    impl StateHolder for Scratch {
        fn type_name(&self) -> SmolStr {
            "scratch".into()
        }

        fn save_state(&self, _ctx: &StateContext) -> Option<SavedValue> {
            None
        }

        fn restore_state(
            &mut self,
            _ctx: &StateContext,
            _state: Option<&SavedValue>,
        ) -> Result<(), RestoreError> {
            Ok(())
        }

        fn is_transient(&self) -> bool {
            true
        }
    }

    /// A context that can restore the test holders.
    pub(crate) fn test_context() -> StateContext {
        let mut registry = HolderRegistry::new();
        registry.register_default::<Counter>();
        registry.register_default::<Tag>();
        StateContext::new(registry)
    }

    #[fixture]
    pub(crate) fn ctx() -> StateContext {
        test_context()
    }

    #[rstest]
    fn instantiate_registered(ctx: StateContext) {
        let holder = ctx.registry().instantiate("counter").unwrap();
        assert_eq!(holder.type_name(), "counter");
        assert!(ctx.registry().contains("tag"));
        assert_eq!(
            ctx.registry().instantiate("missing").unwrap_err(),
            RestoreError::UnknownHolderType("missing".into())
        );
    }

    #[test]
    fn attached_equality() {
        let a = AttachedObject::new(Counter::new(1));
        let mut b = AttachedObject::new(Counter::new(1));
        assert_eq!(a, b);
        b.downcast_mut::<Counter>().unwrap().increment();
        assert_ne!(a, b);
        assert_ne!(a, AttachedObject::new(Tag("1".into())));
        // Holders without an equality never compare equal.
        assert_ne!(AttachedObject::new(Scratch), AttachedObject::new(Scratch));
    }

    #[rstest]
    fn counter_tracks_changes(ctx: StateContext) {
        let mut counter = Counter::new(3);
        assert_eq!(counter.save_state(&ctx), Some(SavedValue::Int(3)));
        counter.mark_initial_state();
        assert_eq!(counter.save_state(&ctx), None);
        counter.increment();
        assert_eq!(counter.save_state(&ctx), Some(SavedValue::Int(4)));
    }

    #[test]
    fn registry_debug_lists_types() {
        let mut registry = HolderRegistry::new();
        registry.register_default::<Tag>();
        registry.register_default::<Counter>();
        assert_eq!(
            format!("{registry:?}"),
            r#"HolderRegistry { types: ["counter", "tag"] }"#
        );
    }
}
