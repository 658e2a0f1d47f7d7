//! An ordered list of attached objects with delta tracking.
//!
//! Structural changes (inserting, removing or replacing elements) cannot be
//! expressed as deltas and drop the list's baseline, so the next save writes
//! out every element. While the baseline holds, saving only writes out the
//! own changes of elements that track them, positionally.

use tracing::debug;

use crate::attached::{restore_holder, save_holder};
use crate::context::StateContext;
use crate::holder::AttachedObject;
use crate::saved::{RestoreError, SavedValue};

/// A list of attached objects, such as a component's listeners.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeltaList {
    items: Vec<AttachedObject>,
    initial_state_marked: bool,
}

impl DeltaList {
    /// Creates an empty list without a baseline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the list has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns an element.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&AttachedObject> {
        self.items.get(index)
    }

    /// Returns an element for in-place changes, which it tracks itself.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut AttachedObject> {
        self.items.get_mut(index)
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, AttachedObject> {
        self.items.iter()
    }

    /// Iterates over the elements, for in-place changes.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, AttachedObject> {
        self.items.iter_mut()
    }

    /// Returns `true` while no structural change happened since the baseline.
    #[must_use]
    pub fn is_initial_state_marked(&self) -> bool {
        self.initial_state_marked
    }

    /// Marks the list and every element as the baseline.
    pub fn mark_initial_state(&mut self) {
        self.initial_state_marked = true;
        for item in &mut self.items {
            item.get_mut().mark_initial_state();
        }
    }

    /// Drops the baseline of the list and of every element.
    pub fn clear_initial_state(&mut self) {
        self.initial_state_marked = false;
        for item in &mut self.items {
            item.get_mut().clear_initial_state();
        }
    }

    /// Appends an element.
    pub fn push(&mut self, item: impl Into<AttachedObject>) {
        self.clear_initial_state();
        self.items.push(item.into());
    }

    /// Inserts an element at `index`.
    ///
    /// # Panics
    ///
    /// If `index > len`.
    pub fn insert(&mut self, index: usize, item: impl Into<AttachedObject>) {
        self.clear_initial_state();
        self.items.insert(index, item.into());
    }

    /// Replaces the element at `index`, returning the old one.
    ///
    /// # Panics
    ///
    /// If `index` is out of bounds.
    pub fn set(&mut self, index: usize, item: impl Into<AttachedObject>) -> AttachedObject {
        self.clear_initial_state();
        std::mem::replace(&mut self.items[index], item.into())
    }

    /// Removes the element at `index`.
    ///
    /// # Panics
    ///
    /// If `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> AttachedObject {
        self.clear_initial_state();
        self.items.remove(index)
    }

    /// Removes the first element equal to `item`.
    pub fn remove_item(&mut self, item: &AttachedObject) -> bool {
        self.clear_initial_state();
        match self.items.iter().position(|i| i == item) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.clear_initial_state();
        self.items.clear();
    }

    /// Keeps only the elements for which `f` returns `true`.
    pub fn retain(&mut self, f: impl FnMut(&AttachedObject) -> bool) {
        self.clear_initial_state();
        self.items.retain(f);
    }

    /// Saves the list.
    ///
    /// Without a baseline this is a [`SavedValue::List`] of every non-transient
    /// element. With one, it is a [`SavedValue::Elements`] sequence holding,
    /// for every position, [`SavedValue::Null`] if the element did not change,
    /// the element's own delta if it tracks changes, or its full state if it
    /// does not. Returns `None` if no element changed.
    #[must_use]
    pub fn save_state(&self, ctx: &StateContext) -> Option<SavedValue> {
        if !self.initial_state_marked {
            return Some(SavedValue::List(
                self.items
                    .iter()
                    .filter_map(|item| save_holder(ctx, item))
                    .collect(),
            ));
        }

        let mut changed = false;
        let elements = self
            .items
            .iter()
            .map(|item| {
                let h = item.get();
                if h.is_transient() {
                    return SavedValue::Null;
                }
                if !h.initial_state_marked() {
                    changed = true;
                    return save_holder(ctx, item).unwrap_or(SavedValue::Null);
                }
                match h.save_state(ctx) {
                    Some(state) => {
                        changed = true;
                        SavedValue::AttachedDelta {
                            ty: h.type_name(),
                            state: Box::new(state),
                        }
                    }
                    None => SavedValue::Null,
                }
            })
            .collect();
        changed.then_some(SavedValue::Elements(elements))
    }

    /// Restores a list saved by [`DeltaList::save_state`].
    ///
    /// A full list replaces the elements and leaves the list without a
    /// baseline. Element deltas are applied positionally. If their number
    /// differs from the number of elements, the list is truncated or
    /// extended to match and falls back to full tracking. Nothing changes if
    /// the restore fails.
    pub fn restore_state(
        &mut self,
        ctx: &StateContext,
        state: Option<&SavedValue>,
    ) -> Result<(), RestoreError> {
        match state {
            None => Ok(()),
            Some(SavedValue::List(items)) => {
                let items = items
                    .iter()
                    .map(|item| match item {
                        SavedValue::Attached { ty, state } => {
                            restore_holder(ctx, ty, state.as_deref())
                        }
                        other => Err(RestoreError::unexpected("an attached object", other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.items = items;
                self.initial_state_marked = false;
                Ok(())
            }
            Some(SavedValue::Elements(elements)) => {
                let len = self.items.len();
                let mut items = Vec::with_capacity(elements.len());
                for (index, element) in elements.iter().enumerate() {
                    let present = self.items.get(index);
                    let item = match (element, present) {
                        (SavedValue::Null, Some(present)) => present.clone(),
                        (SavedValue::Attached { ty, state }, _) => {
                            restore_holder(ctx, ty, state.as_deref())?
                        }
                        (SavedValue::AttachedDelta { ty, state }, Some(present)) => {
                            if present.type_name() != *ty {
                                return Err(RestoreError::DeltaTargetMismatch {
                                    ty: ty.clone(),
                                    found: format!("a holder of type `{}`", present.type_name()),
                                });
                            }
                            let mut updated = present.clone();
                            updated.get_mut().restore_state(ctx, Some(state.as_ref()))?;
                            updated
                        }
                        (SavedValue::Null | SavedValue::AttachedDelta { .. }, None) => {
                            return Err(RestoreError::ElementOutOfRange { index, len });
                        }
                        (other, _) => {
                            return Err(RestoreError::unexpected("an element delta", other));
                        }
                    };
                    items.push(item);
                }
                self.items = items;
                if elements.len() != len {
                    debug!(
                        saved = elements.len(),
                        present = len,
                        "element deltas changed the list length"
                    );
                    self.clear_initial_state();
                }
                Ok(())
            }
            Some(other) => Err(RestoreError::unexpected("a list or element deltas", other)),
        }
    }
}

impl FromIterator<AttachedObject> for DeltaList {
    fn from_iter<I: IntoIterator<Item = AttachedObject>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            initial_state_marked: false,
        }
    }
}

impl Extend<AttachedObject> for DeltaList {
    fn extend<I: IntoIterator<Item = AttachedObject>>(&mut self, iter: I) {
        self.clear_initial_state();
        self.items.extend(iter);
    }
}

impl<'a> IntoIterator for &'a DeltaList {
    type Item = &'a AttachedObject;
    type IntoIter = std::slice::Iter<'a, AttachedObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
