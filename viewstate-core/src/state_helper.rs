//! Per-component property storage with delta tracking.
//!
//! A [`DeltaStateHelper`] keeps every property of a component in its *full
//! state*, which is what all getters read. Until the component's baseline is
//! marked, saving writes out the whole full state. Once
//! [`DeltaStateHelper::mark_initial_state`] has been called, every write is
//! also recorded as a *delta*, and saving only writes out those deltas.
//!
//! Restoring replays a saved sequence through the same write operations, so
//! deltas restored onto a component rebuilt to the same baseline are recorded
//! again and carried into the next save.
//!
//! Deltas come in three shapes:
//!
//! - a replacement of the whole value, or its removal ([`DeltaStateHelper::put`],
//!   [`DeltaStateHelper::remove`]),
//! - added and removed elements of a list property ([`DeltaStateHelper::add`],
//!   [`DeltaStateHelper::remove_item`]),
//! - put and removed entries of a map property ([`DeltaStateHelper::put_entry`],
//!   [`DeltaStateHelper::remove_entry`]).
//!
//! A replacement recorded for a property that is then modified element-wise
//! stays a replacement, holding the new full value.
//!
//! # Panics
//!
//! Property keys must not be empty. List and map operations panic when the
//! property holds a value of another kind. Both are programming errors.

use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::array_map::ArrayMap;
use crate::attached::{apply_holder_delta, restore_attached_state, save_attached_state};
use crate::context::StateContext;
use crate::holder::AttachedObject;
use crate::saved::{RestoreError, SavedProperties, SavedValue};
use crate::value::Value;

/// The name of a component property.
pub type PropertyKey = SmolStr;

/// The map property holding a component's value binding expressions.
pub const BINDINGS_KEY: &str = "bindings";

/// A change recorded after the baseline was marked.
#[derive(Clone, Debug, PartialEq)]
enum Delta {
    /// The property was replaced, or removed if `None`.
    Set(Option<Value>),
    /// Elements added (`true`) to or removed (`false`) from a list property.
    Items(ArrayMap<Value, bool>),
    /// Entries put into (`Some`) or removed from (`None`) a map property.
    Entries(ArrayMap<PropertyKey, Option<Value>>),
}

/// A decoded saved property, ready to be applied.
enum Restored {
    Put(Value),
    Remove,
    Items(Vec<(Value, bool)>),
    Entries(Vec<(PropertyKey, Option<Value>)>),
    Holder(AttachedObject),
}

/// Property storage of a single component.
#[derive(Clone, Debug, Default)]
pub struct DeltaStateHelper {
    /// The current value of every property.
    full_state: ArrayMap<PropertyKey, Value>,
    /// Changes since the baseline. Only present once a change is recorded.
    deltas: Option<ArrayMap<PropertyKey, Delta>>,
    /// Copy of the full state taken before the first change after the baseline.
    initial_full_state: Option<ArrayMap<PropertyKey, Value>>,
    /// Baseline values of the tracked properties.
    initial_state: Option<ArrayMap<PropertyKey, Option<Value>>>,
    /// Values that are never saved.
    transient: Option<ArrayMap<PropertyKey, Value>>,
    initial_state_marked: bool,
    copy_full_initial_state: bool,
}

fn check_key(key: &str) {
    assert!(!key.is_empty(), "property keys must not be empty");
}

fn list_mut<'a>(value: &'a mut Value, key: &str) -> &'a mut Vec<Value> {
    match value {
        Value::List(items) => items,
        other => panic!("property `{key}` holds a {} value, not a list", other.kind_name()),
    }
}

fn list_ref<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    match value {
        Value::List(items) => items,
        other => panic!("property `{key}` holds a {} value, not a list", other.kind_name()),
    }
}

fn map_mut<'a>(
    value: &'a mut Value,
    key: &str,
) -> &'a mut std::collections::BTreeMap<SmolStr, Value> {
    match value {
        Value::Map(entries) => entries,
        other => panic!("property `{key}` holds a {} value, not a map", other.kind_name()),
    }
}

/// Records an element change, unless the property was replaced as a whole.
///
/// Element changes are keyed by value, so a second change of an element
/// already in the log replaces the log with the current list.
fn record_item(
    deltas: &mut ArrayMap<PropertyKey, Delta>,
    key: PropertyKey,
    item: Value,
    added: bool,
    current: &Value,
) {
    match deltas.get_mut(&key) {
        Some(Delta::Items(items)) if items.get(&item).is_none() => {
            items.insert(item, added);
        }
        Some(delta) => *delta = Delta::Set(Some(current.clone())),
        None => {
            deltas.insert(key, Delta::Items(ArrayMap::from_iter([(item, added)])));
        }
    }
}

/// Records an entry change, unless the property was replaced as a whole.
fn record_entry(
    deltas: &mut ArrayMap<PropertyKey, Delta>,
    key: PropertyKey,
    name: PropertyKey,
    value: Option<Value>,
    current: &Value,
) {
    match deltas.get_mut(&key) {
        Some(Delta::Entries(entries)) => {
            entries.insert(name, value);
        }
        Some(delta) => *delta = Delta::Set(Some(current.clone())),
        None => {
            deltas.insert(key, Delta::Entries(ArrayMap::from_iter([(name, value)])));
        }
    }
}

impl DeltaStateHelper {
    /// Creates an empty helper with no baseline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the baseline is marked and changes are recorded.
    #[must_use]
    pub fn is_initial_state_marked(&self) -> bool {
        self.initial_state_marked
    }

    /// Marks the current full state as the baseline.
    ///
    /// Changes recorded against an earlier baseline are dropped. Holders
    /// stored directly as property values are marked too.
    pub fn mark_initial_state(&mut self) {
        self.initial_state_marked = true;
        self.deltas = None;
        self.initial_full_state = None;
        for (_, value) in self.full_state.iter_mut() {
            if let Value::Holder(holder) = value {
                holder.get_mut().mark_initial_state();
            }
        }
    }

    /// Drops the baseline. The next save writes out the full state.
    pub fn clear_initial_state(&mut self) {
        self.initial_state_marked = false;
        self.deltas = None;
        self.initial_full_state = None;
        for (_, value) in self.full_state.iter_mut() {
            if let Value::Holder(holder) = value {
                holder.get_mut().clear_initial_state();
            }
        }
    }

    /// Enables copying the full state before the first change after the
    /// baseline, which [`DeltaStateHelper::reset_hard_state`] returns to.
    pub fn set_copy_full_initial_state(&mut self, copy: bool) {
        self.copy_full_initial_state = copy;
    }

    /// Declares the baseline values of tracked properties.
    ///
    /// A tracked property whose change nets out to its baseline value is left
    /// out of the saved deltas. A property already set in the full state uses
    /// that value as its baseline instead of the declared default.
    pub fn mark_property_in_initial_state(
        &mut self,
        defaults: impl IntoIterator<Item = (PropertyKey, Option<Value>)>,
    ) {
        let table = self.initial_state.get_or_insert_with(ArrayMap::new);
        for (key, default) in defaults {
            check_key(&key);
            let baseline = self.full_state.get(&key).cloned().or(default);
            table.insert(key, baseline);
        }
    }

    /// Returns `true` if a change was recorded since the baseline.
    #[must_use]
    pub fn has_deltas(&self) -> bool {
        self.deltas.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// The current value of every property, in insertion order.
    #[must_use]
    pub fn full_state(&self) -> &ArrayMap<PropertyKey, Value> {
        &self.full_state
    }

    /// The number of properties set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.full_state.len()
    }

    /// Returns `true` if no property is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.full_state.is_empty()
    }

    /// Returns the current value of a property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.full_state.get(key)
    }

    /// Returns `true` if the property is set.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.full_state.contains_key(key)
    }

    /// Returns the value of a property, falling back to its value binding
    /// and then to `default`.
    ///
    /// Bindings are the expressions stored in the [`BINDINGS_KEY`] map
    /// property and are evaluated by the context's resolver.
    #[must_use]
    pub fn eval(&self, ctx: &StateContext, key: &str, default: Option<Value>) -> Option<Value> {
        if let Some(value) = self.get(key) {
            return Some(value.clone());
        }
        self.get_entry(BINDINGS_KEY, key)
            .and_then(Value::as_str)
            .and_then(|expression| ctx.resolve(expression))
            .or(default)
    }

    /// Copies the full state before the first change after the baseline.
    fn snapshot(&mut self) {
        if self.copy_full_initial_state && self.initial_full_state.is_none() {
            self.initial_full_state = Some(self.full_state.clone());
        }
    }

    /// Sets a property, returning its previous value.
    ///
    /// # Panics
    ///
    /// If `key` is empty.
    pub fn put(&mut self, key: impl Into<PropertyKey>, value: Value) -> Option<Value> {
        let key = key.into();
        check_key(&key);
        if self.initial_state_marked {
            self.snapshot();
            self.deltas
                .get_or_insert_with(ArrayMap::new)
                .insert(key.clone(), Delta::Set(Some(value.clone())));
        }
        self.full_state.insert(key, value)
    }

    /// Sets a property to `Some` value, or removes it on `None`.
    ///
    /// # Panics
    ///
    /// If `key` is empty.
    pub fn set(&mut self, key: impl Into<PropertyKey>, value: Option<Value>) -> Option<Value> {
        let key = key.into();
        match value {
            Some(value) => self.put(key, value),
            None => self.remove(&key),
        }
    }

    /// Removes a property, returning its value.
    ///
    /// Once the baseline is marked the removal is recorded as an explicit
    /// deletion. Removing a property that is not set does nothing.
    ///
    /// # Panics
    ///
    /// If `key` is empty.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        check_key(key);
        if !self.full_state.contains_key(key) {
            return None;
        }
        if self.initial_state_marked {
            self.snapshot();
            self.deltas
                .get_or_insert_with(ArrayMap::new)
                .insert(key.into(), Delta::Set(None));
        }
        self.full_state.remove(key)
    }

    /// Appends an element to a list property, creating the list if needed.
    ///
    /// # Panics
    ///
    /// If `key` is empty or the property holds something other than a list.
    pub fn add(&mut self, key: impl Into<PropertyKey>, item: Value) {
        let key = key.into();
        check_key(&key);
        if self.initial_state_marked {
            self.snapshot();
        }
        let list = self.full_state.get_or_insert_with(key.clone(), Value::empty_list);
        list_mut(list, &key).push(item.clone());
        if self.initial_state_marked {
            if let Some(current) = self.full_state.get(&key) {
                let deltas = self.deltas.get_or_insert_with(ArrayMap::new);
                record_item(deltas, key, item, true, current);
            }
        }
    }

    /// Removes the first element equal to `item` from a list property.
    ///
    /// Returns `false` if there was no such element.
    ///
    /// # Panics
    ///
    /// If `key` is empty or the property holds something other than a list.
    pub fn remove_item(&mut self, key: &str, item: &Value) -> bool {
        check_key(key);
        let Some(position) = self
            .full_state
            .get(key)
            .and_then(|list| list_ref(list, key).iter().position(|v| v == item))
        else {
            return false;
        };
        if self.initial_state_marked {
            self.snapshot();
        }
        if let Some(list) = self.full_state.get_mut(key) {
            list_mut(list, key).remove(position);
        }
        if self.initial_state_marked {
            if let Some(current) = self.full_state.get(key) {
                let deltas = self.deltas.get_or_insert_with(ArrayMap::new);
                record_item(deltas, key.into(), item.clone(), false, current);
            }
        }
        true
    }

    /// Returns an entry of a map property.
    #[must_use]
    pub fn get_entry(&self, key: &str, name: &str) -> Option<&Value> {
        self.get(key)?.as_map()?.get(name)
    }

    /// Puts an entry into a map property, creating the map if needed.
    ///
    /// # Panics
    ///
    /// If `key` is empty or the property holds something other than a map.
    pub fn put_entry(
        &mut self,
        key: impl Into<PropertyKey>,
        name: impl Into<PropertyKey>,
        value: Value,
    ) -> Option<Value> {
        let (key, name) = (key.into(), name.into());
        check_key(&key);
        if self.initial_state_marked {
            self.snapshot();
        }
        let map = self.full_state.get_or_insert_with(key.clone(), Value::empty_map);
        let previous = map_mut(map, &key).insert(name.clone(), value.clone());
        if self.initial_state_marked {
            if let Some(current) = self.full_state.get(&key) {
                let deltas = self.deltas.get_or_insert_with(ArrayMap::new);
                record_entry(deltas, key, name, Some(value), current);
            }
        }
        previous
    }

    /// Removes an entry from a map property.
    ///
    /// # Panics
    ///
    /// If `key` is empty or the property holds something other than a map.
    pub fn remove_entry(&mut self, key: &str, name: &str) -> Option<Value> {
        check_key(key);
        let present = match self.full_state.get_mut(key) {
            Some(map) => map_mut(map, key).contains_key(name),
            None => false,
        };
        if !present {
            return None;
        }
        if self.initial_state_marked {
            self.snapshot();
        }
        let previous = self
            .full_state
            .get_mut(key)
            .and_then(|map| map_mut(map, key).remove(name));
        if self.initial_state_marked {
            if let Some(current) = self.full_state.get(key) {
                let deltas = self.deltas.get_or_insert_with(ArrayMap::new);
                record_entry(deltas, key.into(), name.into(), None, current);
            }
        }
        previous
    }

    /// Returns a holder stored as a property value, for in-place changes.
    ///
    /// The holder tracks its own changes, so no delta is recorded here.
    pub fn holder_mut(&mut self, key: &str) -> Option<&mut AttachedObject> {
        if !matches!(self.full_state.get(key), Some(Value::Holder(_))) {
            return None;
        }
        if self.initial_state_marked {
            self.snapshot();
        }
        self.full_state.get_mut(key).and_then(Value::as_holder_mut)
    }

    /// Sets a value that is never saved.
    ///
    /// # Panics
    ///
    /// If `key` is empty.
    pub fn put_transient(&mut self, key: impl Into<PropertyKey>, value: Value) -> Option<Value> {
        let key = key.into();
        check_key(&key);
        self.transient
            .get_or_insert_with(ArrayMap::new)
            .insert(key, value)
    }

    /// Returns a transient value.
    #[must_use]
    pub fn get_transient(&self, key: &str) -> Option<&Value> {
        self.transient.as_ref()?.get(key)
    }

    /// Removes a transient value.
    pub fn remove_transient(&mut self, key: &str) -> Option<Value> {
        self.transient.as_mut()?.remove(key)
    }

    /// Returns the full state to the copy taken before the first change
    /// after the baseline, and drops the recorded deltas and transient values.
    ///
    /// Returns `false` if there were changes but no copy to return to, in
    /// which case the full state is left as it is.
    pub fn reset_hard_state(&mut self) -> bool {
        self.transient = None;
        if !self.has_deltas() {
            return true;
        }
        match self.initial_full_state.take() {
            Some(snapshot) => {
                self.full_state = snapshot;
                self.deltas = None;
                debug!("reset property state to its baseline copy");
                true
            }
            None => {
                warn!("cannot reset property state: no baseline copy was taken");
                false
            }
        }
    }

    /// Puts every tracked property back to its baseline value and drops the
    /// transient values.
    ///
    /// The writes net out to the baseline and are left out of saved deltas.
    pub fn reset_soft_state(&mut self) {
        self.transient = None;
        let Some(table) = self.initial_state.clone() else {
            return;
        };
        for (key, baseline) in table {
            match baseline {
                Some(value) => {
                    if self.full_state.get(&key) != Some(&value) {
                        self.put(key, value);
                    }
                }
                None => {
                    self.remove(&key);
                }
            }
        }
    }

    /// Saves the properties.
    ///
    /// Without a baseline every property is saved. With a baseline only the
    /// recorded changes are saved, leaving out replacements that equal the
    /// baseline value of a tracked property, plus the own changes of marked
    /// holders. Returns `None` when there is nothing to save.
    #[must_use]
    pub fn save_state(&self, ctx: &StateContext) -> Option<SavedProperties> {
        let mut saved = SavedProperties::new();
        if !self.initial_state_marked {
            for (key, value) in self.full_state.iter() {
                if let Some(value) = save_attached_state(ctx, value) {
                    saved.push(key.clone(), value);
                }
            }
            debug!(properties = saved.len(), "saved full property state");
            return Some(saved);
        }

        let baseline = |key: &str| self.initial_state.as_ref().and_then(|t| t.get(key));
        for (key, delta) in self.deltas.iter().flat_map(ArrayMap::iter) {
            let value = match delta {
                Delta::Set(value) if baseline(key) == Some(value) => continue,
                Delta::Set(None) => SavedValue::Null,
                Delta::Set(Some(value)) => match save_attached_state(ctx, value) {
                    Some(value) => value,
                    None => continue,
                },
                Delta::Items(items) => SavedValue::ListChanges(
                    items
                        .iter()
                        .filter_map(|(item, added)| Some((save_attached_state(ctx, item)?, *added)))
                        .collect(),
                ),
                Delta::Entries(entries) => SavedValue::MapChanges(
                    entries
                        .iter()
                        .map(|(name, value)| {
                            let value = value.as_ref().and_then(|v| save_attached_state(ctx, v));
                            (name.clone(), value.unwrap_or(SavedValue::Null))
                        })
                        .collect(),
                ),
            };
            saved.push(key.clone(), value);
        }

        for (key, value) in self.full_state.iter() {
            let Value::Holder(holder) = value else {
                continue;
            };
            let h = holder.get();
            if saved.contains_key(key) || h.is_transient() || !h.initial_state_marked() {
                continue;
            }
            if let Some(state) = h.save_state(ctx) {
                let delta = SavedValue::AttachedDelta {
                    ty: h.type_name(),
                    state: Box::new(state),
                };
                saved.push(key.clone(), delta);
            }
        }

        debug!(properties = saved.len(), "saved property deltas");
        (!saved.is_empty()).then_some(saved)
    }

    /// Restores properties saved by [`DeltaStateHelper::save_state`].
    ///
    /// Without a baseline the full state is replaced. With a baseline the
    /// saved changes are replayed in order and recorded again. The whole
    /// sequence is decoded before anything changes, so a failed restore
    /// leaves the helper untouched.
    pub fn restore_state(
        &mut self,
        ctx: &StateContext,
        state: Option<&SavedProperties>,
    ) -> Result<(), RestoreError> {
        let Some(state) = state else {
            return Ok(());
        };
        let restored = state
            .iter()
            .map(|(key, value)| {
                check_key(key);
                let restored = self
                    .decode(ctx, key, value)
                    .map_err(|e| e.in_property(key))?;
                Ok((key.clone(), restored))
            })
            .collect::<Result<Vec<_>, RestoreError>>()?;

        if !self.initial_state_marked {
            self.full_state.clear();
        }
        for (key, restored) in restored {
            match restored {
                Restored::Put(value) => {
                    self.put(key, value);
                }
                Restored::Remove => {
                    self.remove(&key);
                }
                Restored::Items(items) => {
                    for (item, added) in items {
                        if added {
                            self.add(key.clone(), item);
                        } else {
                            self.remove_item(&key, &item);
                        }
                    }
                }
                Restored::Entries(entries) => {
                    for (name, value) in entries {
                        match value {
                            Some(value) => {
                                self.put_entry(key.clone(), name, value);
                            }
                            None => {
                                self.remove_entry(&key, &name);
                            }
                        }
                    }
                }
                Restored::Holder(holder) => {
                    if self.initial_state_marked {
                        self.snapshot();
                    }
                    self.full_state.insert(key, Value::Holder(holder));
                }
            }
        }
        debug!(
            properties = state.len(),
            marked = self.initial_state_marked,
            "restored property state"
        );
        Ok(())
    }

    fn decode(
        &self,
        ctx: &StateContext,
        key: &str,
        value: &SavedValue,
    ) -> Result<Restored, RestoreError> {
        let expect_kind = |expected: &'static str, matches: fn(&Value) -> bool| {
            match self.full_state.get(key) {
                Some(present) if !matches(present) => Err(RestoreError::UnexpectedShape {
                    expected,
                    found: present.kind_name(),
                }),
                _ => Ok(()),
            }
        };
        Ok(match value {
            SavedValue::AttachedDelta { ty, state } => {
                Restored::Holder(apply_holder_delta(ctx, self.full_state.get(key), ty, state)?)
            }
            SavedValue::ListChanges(changes) => {
                expect_kind("a list property", |v| matches!(v, Value::List(_)))?;
                let mut items = Vec::with_capacity(changes.len());
                for (item, added) in changes {
                    if let Some(item) = restore_attached_state(ctx, item)? {
                        items.push((item, *added));
                    }
                }
                Restored::Items(items)
            }
            SavedValue::MapChanges(changes) => {
                expect_kind("a map property", |v| matches!(v, Value::Map(_)))?;
                let mut entries = Vec::with_capacity(changes.len());
                for (name, value) in changes {
                    entries.push((name.clone(), restore_attached_state(ctx, value)?));
                }
                Restored::Entries(entries)
            }
            other => match restore_attached_state(ctx, other)? {
                Some(value) => Restored::Put(value),
                None => Restored::Remove,
            },
        })
    }
}
