//! Per-node component data.

use std::sync::{Arc, LazyLock};

use smol_str::SmolStr;

use crate::class::{ComponentClass, ComponentType, class_of};
use crate::context::StateContext;
use crate::delta_list::DeltaList;
use crate::saved::{NodeState, RestoreError, SavedValue};
use crate::state_helper::DeltaStateHelper;
use crate::value::Value;

/// How [`Component::reset_state`] returns a component to its baseline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResetMode {
    /// Restore the copy of the properties taken before the first change.
    #[default]
    Hard,
    /// Put the tracked properties back to their baseline values.
    Soft,
}

/// The class of components created without one.
static GENERIC_CLASS: LazyLock<Arc<ComponentClass>> =
    LazyLock::new(|| Arc::new(ComponentClass::new("component")));

/// The data attached to a node of a [`ComponentTree`].
///
/// [`ComponentTree`]: crate::tree::ComponentTree
#[derive(Clone, Debug)]
pub struct Component {
    class: Arc<ComponentClass>,
    id: Option<SmolStr>,
    transient: bool,
    state: DeltaStateHelper,
    listeners: DeltaList,
}

impl Default for Component {
    fn default() -> Self {
        Self::new(GENERIC_CLASS.clone())
    }
}

impl Component {
    /// Creates a component of the given class.
    #[must_use]
    pub fn new(class: Arc<ComponentClass>) -> Self {
        Self {
            class,
            id: None,
            transient: false,
            state: DeltaStateHelper::new(),
            listeners: DeltaList::new(),
        }
    }

    /// Creates a component of a registered [`ComponentType`].
    #[must_use]
    pub fn of<T: ComponentType>() -> Self {
        Self::new(class_of::<T>())
    }

    /// Sets the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<SmolStr>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Marks the component as transient.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// The component's class.
    #[must_use]
    pub fn class(&self) -> &Arc<ComponentClass> {
        &self.class
    }

    /// The component family.
    #[must_use]
    pub fn family(&self) -> &str {
        self.class.family()
    }

    /// The component id.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Changes the component id.
    pub fn set_id(&mut self, id: Option<SmolStr>) {
        self.id = id;
    }

    /// Returns `true` if the component and its subtree are never saved.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Changes whether the component is saved.
    pub fn set_transient(&mut self, transient: bool) {
        self.transient = transient;
    }

    /// The component's properties.
    #[must_use]
    pub fn state(&self) -> &DeltaStateHelper {
        &self.state
    }

    /// The component's properties, for writing.
    pub fn state_mut(&mut self) -> &mut DeltaStateHelper {
        &mut self.state
    }

    /// The current value of a property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// The component's attached listeners.
    #[must_use]
    pub fn listeners(&self) -> &DeltaList {
        &self.listeners
    }

    /// The component's attached listeners, for writing.
    pub fn listeners_mut(&mut self) -> &mut DeltaList {
        &mut self.listeners
    }

    /// Returns `true` once the baseline is marked.
    #[must_use]
    pub fn is_initial_state_marked(&self) -> bool {
        self.state.is_initial_state_marked()
    }

    /// Marks the current state as the baseline.
    ///
    /// The properties start recording deltas and keep a copy of their state
    /// for [`ResetMode::Hard`]. The class's tracked properties become the
    /// baseline table, and the listeners are marked too.
    pub fn mark_initial_state(&mut self) {
        self.state.set_copy_full_initial_state(true);
        self.state.mark_initial_state();
        self.state
            .mark_property_in_initial_state(self.class.tracked_defaults());
        self.listeners.mark_initial_state();
    }

    /// Drops the baseline of the properties and listeners.
    pub fn clear_initial_state(&mut self) {
        self.state.clear_initial_state();
        self.listeners.clear_initial_state();
    }

    /// Saves the component.
    ///
    /// A component with a baseline saves its deltas, or `None` if nothing
    /// changed. Otherwise the full state is saved, along with the id.
    #[must_use]
    pub fn save_state(&self, ctx: &StateContext) -> Option<NodeState> {
        if self.is_initial_state_marked() {
            let properties = self.state.save_state(ctx);
            let listeners = self.listeners.save_state(ctx);
            if properties.is_none() && listeners.is_none() {
                return None;
            }
            return Some(NodeState::Delta {
                listeners,
                properties,
            });
        }

        let listeners = if self.listeners.is_empty() {
            None
        } else if self.listeners.is_initial_state_marked() {
            let mut full = self.listeners.clone();
            full.clear_initial_state();
            full.save_state(ctx)
        } else {
            self.listeners.save_state(ctx)
        };
        Some(NodeState::Full {
            id: self.id.clone(),
            listeners,
            properties: self.state.save_state(ctx).unwrap_or_default(),
        })
    }

    /// Restores a component saved by [`Component::save_state`].
    ///
    /// `None` means nothing changed, which is only valid once the baseline is
    /// marked. A full state restored onto a marked component drops its
    /// baseline first. Nothing changes if the restore fails.
    pub fn restore_state(
        &mut self,
        ctx: &StateContext,
        state: Option<&NodeState>,
    ) -> Result<(), RestoreError> {
        if let Some(restored) = self.restored(ctx, state)? {
            *self = restored;
        }
        Ok(())
    }

    /// Computes the result of [`Component::restore_state`] without changing
    /// the component. Returns `None` if the component stays as it is.
    pub(crate) fn restored(
        &self,
        ctx: &StateContext,
        state: Option<&NodeState>,
    ) -> Result<Option<Self>, RestoreError> {
        let marked = self.is_initial_state_marked();
        let mut next = self.clone();
        match state {
            None if marked => return Ok(None),
            None => return Err(RestoreError::MissingState),
            Some(NodeState::Delta { .. }) if !marked => {
                return Err(RestoreError::UnexpectedShape {
                    expected: "full component state",
                    found: "delta component state",
                });
            }
            Some(NodeState::Delta {
                listeners,
                properties,
            }) => {
                next.state.restore_state(ctx, properties.as_ref())?;
                next.listeners.restore_state(ctx, listeners.as_ref())?;
            }
            Some(NodeState::Full {
                id,
                listeners,
                properties,
            }) => {
                next.clear_initial_state();
                next.id = id.clone();
                next.state.restore_state(ctx, Some(properties))?;
                match listeners {
                    None => next.listeners = DeltaList::new(),
                    Some(listeners @ SavedValue::List(_)) => {
                        next.listeners.restore_state(ctx, Some(listeners))?;
                    }
                    Some(other) => return Err(RestoreError::unexpected("a listener list", other)),
                }
            }
        }
        Ok(Some(next))
    }

    /// Returns the component to its baseline and drops transient values.
    ///
    /// Returns `false` if a hard reset found changes but no copy of the
    /// baseline to return to.
    pub fn reset_state(&mut self, mode: ResetMode) -> bool {
        match mode {
            ResetMode::Hard => self.state.reset_hard_state(),
            ResetMode::Soft => {
                self.state.reset_soft_state();
                true
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::class::PropertyDescriptor;
    use crate::holder::test::{Counter, ctx};
    use crate::saved::SavedProperties;
    use crate::std_components::{Input, Output};

    fn output(value: &str) -> Component {
        let mut output = Component::of::<Output>().with_id("out");
        output.state_mut().put("value", value.into());
        output
    }

    #[fixture]
    fn marked_output() -> Component {
        let mut output = output("A");
        output.mark_initial_state();
        output
    }

    /// A class whose `value` is tracked with a baseline of `"A"`.
    fn tracked_class() -> Arc<ComponentClass> {
        Arc::new(
            ComponentClass::new("tracked")
                .with_property(PropertyDescriptor::new("value").with_default("A").tracked()),
        )
    }

    #[rstest]
    fn unchanged_saves_nothing(ctx: StateContext, marked_output: Component) {
        assert_eq!(marked_output.save_state(&ctx), None);
    }

    #[rstest]
    fn changed_value_replays_onto_fresh_component(ctx: StateContext, mut marked_output: Component) {
        marked_output.state_mut().put("value", "B".into());
        let saved = marked_output.save_state(&ctx).unwrap();
        assert_eq!(
            saved,
            NodeState::Delta {
                listeners: None,
                properties: Some(SavedProperties::from_iter([(
                    "value".into(),
                    SavedValue::Str("B".into())
                )])),
            }
        );

        let mut fresh = Component::of::<Output>();
        fresh.mark_initial_state();
        fresh.restore_state(&ctx, Some(&saved)).unwrap();
        assert_eq!(fresh.get("value"), Some(&Value::from("B")));
        assert_eq!(fresh.save_state(&ctx), Some(saved));
    }

    #[rstest]
    fn net_zero_change_is_elided(ctx: StateContext) {
        let mut component = Component::new(tracked_class());
        component.state_mut().put("value", "A".into());
        component.mark_initial_state();
        component.state_mut().put("value", "B".into());
        component.state_mut().put("value", "A".into());
        assert_eq!(component.save_state(&ctx), None);
    }

    #[rstest]
    fn full_state_roundtrip(ctx: StateContext) {
        let mut component = output("A");
        component.listeners_mut().push(Counter::new(2));
        let saved = component.save_state(&ctx).unwrap();
        assert!(!saved.is_delta());

        let mut restored = Component::of::<Output>();
        restored.restore_state(&ctx, Some(&saved)).unwrap();
        assert_eq!(restored.id(), Some("out"));
        assert_eq!(restored.get("value"), Some(&Value::from("A")));
        assert_eq!(restored.listeners(), component.listeners());
    }

    #[rstest]
    fn full_state_drops_baseline(ctx: StateContext, mut marked_output: Component) {
        let saved = output("C").save_state(&ctx);
        marked_output.restore_state(&ctx, saved.as_ref()).unwrap();
        assert!(!marked_output.is_initial_state_marked());
        assert_eq!(marked_output.get("value"), Some(&Value::from("C")));
    }

    #[rstest]
    fn listener_deltas(ctx: StateContext) {
        let mut component = Component::of::<Input>();
        component.listeners_mut().push(Counter::new(0));
        component.mark_initial_state();
        component
            .listeners_mut()
            .get_mut(0)
            .and_then(|l| l.downcast_mut::<Counter>())
            .unwrap()
            .increment();
        let saved = component.save_state(&ctx).unwrap();
        assert!(saved.properties().is_none());
        assert!(matches!(saved.listeners(), Some(SavedValue::Elements(_))));

        let mut fresh = Component::of::<Input>();
        fresh.listeners_mut().push(Counter::new(0));
        fresh.mark_initial_state();
        fresh.restore_state(&ctx, Some(&saved)).unwrap();
        let counter = fresh.listeners().get(0).unwrap();
        assert_eq!(counter.downcast_ref::<Counter>().unwrap().count, 1);
    }

    #[rstest]
    fn missing_state_needs_baseline(ctx: StateContext, mut marked_output: Component) {
        marked_output.restore_state(&ctx, None).unwrap();
        let mut unmarked = output("A");
        assert_eq!(
            unmarked.restore_state(&ctx, None),
            Err(RestoreError::MissingState)
        );
        let delta = NodeState::Delta {
            listeners: None,
            properties: None,
        };
        assert!(matches!(
            unmarked.restore_state(&ctx, Some(&delta)),
            Err(RestoreError::UnexpectedShape { .. })
        ));
    }

    #[rstest]
    fn failed_restore_changes_nothing(ctx: StateContext, mut marked_output: Component) {
        let state = NodeState::Delta {
            listeners: Some(SavedValue::Elements(vec![SavedValue::Null])),
            properties: Some(SavedProperties::from_iter([(
                "value".into(),
                SavedValue::Str("B".into()),
            )])),
        };
        assert!(matches!(
            marked_output.restore_state(&ctx, Some(&state)),
            Err(RestoreError::ElementOutOfRange { index: 0, len: 0 })
        ));
        assert_eq!(marked_output.get("value"), Some(&Value::from("A")));
        assert_eq!(marked_output.save_state(&ctx), None);
    }

    #[rstest]
    #[case(ResetMode::Hard)]
    #[case(ResetMode::Soft)]
    fn reset(ctx: StateContext, #[case] mode: ResetMode) {
        let mut component = Component::new(tracked_class());
        component.state_mut().put("value", "A".into());
        component.mark_initial_state();
        component.state_mut().put("value", "Z".into());
        assert!(component.reset_state(mode));
        assert_eq!(component.get("value"), Some(&Value::from("A")));
        assert_eq!(component.save_state(&ctx), None);
    }

    #[test]
    fn default_component() {
        let component = Component::default();
        assert_eq!(component.family(), "component");
        assert!(!component.is_transient());
        assert!(Component::default().transient().is_transient());
    }
}
