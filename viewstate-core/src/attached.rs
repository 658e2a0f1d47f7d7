//! Saving and restoring property values.
//!
//! Plain values map one to one onto [`SavedValue`] literals. Holders are
//! wrapped with their type name so the restoring side can re-instantiate
//! them before handing their nested state back.

use crate::context::StateContext;
use crate::holder::AttachedObject;
use crate::saved::{RestoreError, SavedValue};
use crate::value::Value;

/// Saves a value in full.
///
/// Returns `None` for transient holders, which are also left out of saved
/// lists and maps.
#[must_use]
pub fn save_attached_state(ctx: &StateContext, value: &Value) -> Option<SavedValue> {
    Some(match value {
        Value::Bool(b) => SavedValue::Bool(*b),
        Value::Int(i) => SavedValue::Int(*i),
        Value::Float(f) => SavedValue::Float(*f),
        Value::Str(s) => SavedValue::Str(s.clone()),
        Value::List(items) => SavedValue::List(
            items
                .iter()
                .filter_map(|v| save_attached_state(ctx, v))
                .collect(),
        ),
        Value::Map(entries) => SavedValue::Map(
            entries
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), save_attached_state(ctx, v)?)))
                .collect(),
        ),
        Value::Holder(holder) => return save_holder(ctx, holder),
    })
}

/// Saves the full state of a holder, even if it is tracking changes.
pub(crate) fn save_holder(ctx: &StateContext, holder: &AttachedObject) -> Option<SavedValue> {
    let h = holder.get();
    if h.is_transient() {
        return None;
    }
    let state = if h.initial_state_marked() {
        let mut full = holder.clone();
        full.get_mut().clear_initial_state();
        full.get().save_state(ctx)
    } else {
        h.save_state(ctx)
    };
    Some(SavedValue::Attached {
        ty: h.type_name(),
        state: state.map(Box::new),
    })
}

/// Restores a value saved by [`save_attached_state`].
///
/// [`SavedValue::Null`] restores as `None`. Markers that only make sense
/// relative to a baseline are rejected.
pub fn restore_attached_state(
    ctx: &StateContext,
    state: &SavedValue,
) -> Result<Option<Value>, RestoreError> {
    Ok(Some(match state {
        SavedValue::Null => return Ok(None),
        SavedValue::Bool(b) => Value::Bool(*b),
        SavedValue::Int(i) => Value::Int(*i),
        SavedValue::Float(f) => Value::Float(*f),
        SavedValue::Str(s) => Value::Str(s.clone()),
        SavedValue::List(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.extend(restore_attached_state(ctx, item)?);
            }
            Value::List(list)
        }
        SavedValue::Map(entries) => {
            let mut map = std::collections::BTreeMap::new();
            for (k, v) in entries {
                if let Some(v) = restore_attached_state(ctx, v)? {
                    map.insert(k.clone(), v);
                }
            }
            Value::Map(map)
        }
        SavedValue::Attached { ty, state } => {
            Value::Holder(restore_holder(ctx, ty, state.as_deref())?)
        }
        other => return Err(RestoreError::unexpected("a full value", other)),
    }))
}

/// Re-instantiates a holder and restores its full state.
pub(crate) fn restore_holder(
    ctx: &StateContext,
    ty: &str,
    state: Option<&SavedValue>,
) -> Result<AttachedObject, RestoreError> {
    let mut holder = ctx.registry().instantiate(ty)?;
    holder.restore_state(ctx, state)?;
    Ok(AttachedObject::from_box(holder))
}

/// Applies a holder delta to a copy of the holder already present.
pub(crate) fn apply_holder_delta(
    ctx: &StateContext,
    present: Option<&Value>,
    ty: &str,
    delta: &SavedValue,
) -> Result<AttachedObject, RestoreError> {
    let mismatch = |found: String| RestoreError::DeltaTargetMismatch {
        ty: ty.into(),
        found,
    };
    let holder = match present {
        Some(Value::Holder(h)) if h.type_name() == ty => h,
        Some(Value::Holder(h)) => {
            return Err(mismatch(format!("a holder of type `{}`", h.type_name())));
        }
        Some(other) => return Err(mismatch(format!("a {} value", other.kind_name()))),
        None => return Err(mismatch("an absent value".to_string())),
    };
    let mut updated = holder.clone();
    updated.get_mut().restore_state(ctx, Some(delta))?;
    Ok(updated)
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use rstest::rstest;

    use super::*;
    use crate::holder::StateHolder;
    use crate::holder::test::{Counter, Scratch, Tag, ctx};

    #[rstest]
    fn plain_values_roundtrip(ctx: StateContext) {
        let value = Value::Map(BTreeMap::from([
            ("flag".into(), Value::Bool(true)),
            ("items".into(), Value::List(vec![1.into(), "two".into(), 0.5.into()])),
        ]));
        let saved = save_attached_state(&ctx, &value).unwrap();
        assert_eq!(restore_attached_state(&ctx, &saved).unwrap(), Some(value));
    }

    #[rstest]
    fn holders_roundtrip_through_registry(ctx: StateContext) {
        let value = Value::Holder(Tag("bold".into()).into());
        let saved = save_attached_state(&ctx, &value).unwrap();
        assert_eq!(
            saved,
            SavedValue::Attached {
                ty: "tag".into(),
                state: Some(Box::new(SavedValue::Str("bold".into())))
            }
        );
        assert_eq!(restore_attached_state(&ctx, &saved).unwrap(), Some(value));
    }

    #[rstest]
    fn marked_holders_save_in_full(ctx: StateContext) {
        let mut counter = Counter::new(5);
        counter.mark_initial_state();
        let saved = save_attached_state(&ctx, &Value::Holder(counter.into())).unwrap();
        assert_eq!(
            saved,
            SavedValue::Attached {
                ty: "counter".into(),
                state: Some(Box::new(SavedValue::Int(5)))
            }
        );
    }

    #[rstest]
    fn transient_holders_are_dropped(ctx: StateContext) {
        let value = Value::List(vec![Value::Holder(Scratch.into()), 1.into()]);
        assert_eq!(
            save_attached_state(&ctx, &value),
            Some(SavedValue::List(vec![SavedValue::Int(1)]))
        );
        assert_eq!(save_attached_state(&ctx, &Value::Holder(Scratch.into())), None);
    }

    #[rstest]
    #[case(SavedValue::AttachedDelta { ty: "counter".into(), state: Box::new(SavedValue::Int(1)) })]
    #[case(SavedValue::Elements(vec![]))]
    #[case(SavedValue::ListChanges(vec![]))]
    fn delta_markers_are_rejected(ctx: StateContext, #[case] state: SavedValue) {
        assert!(matches!(
            restore_attached_state(&ctx, &state),
            Err(RestoreError::UnexpectedShape { .. })
        ));
    }

    #[rstest]
    fn unknown_holder_type(ctx: StateContext) {
        let saved = SavedValue::Attached {
            ty: "widget".into(),
            state: None,
        };
        assert_eq!(
            restore_attached_state(&ctx, &saved),
            Err(RestoreError::UnknownHolderType("widget".into()))
        );
    }

    #[rstest]
    fn holder_delta_needs_matching_target(ctx: StateContext) {
        let delta = SavedValue::Int(9);
        let present = Value::Holder(Counter::new(1).into());
        let updated = apply_holder_delta(&ctx, Some(&present), "counter", &delta).unwrap();
        assert_eq!(updated.downcast_ref::<Counter>().unwrap().count, 9);

        let tag = Value::Holder(Tag::default().into());
        assert!(matches!(
            apply_holder_delta(&ctx, Some(&tag), "counter", &delta),
            Err(RestoreError::DeltaTargetMismatch { .. })
        ));
        assert!(matches!(
            apply_holder_delta(&ctx, None, "counter", &delta),
            Err(RestoreError::DeltaTargetMismatch { .. })
        ));
    }
}
