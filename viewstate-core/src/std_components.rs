//! The standard component types.

use crate::class::{ComponentClass, ComponentType, PropertyDescriptor};
use crate::value::Value;

/// Family of [`ViewRoot`].
pub const VIEW_ROOT_FAMILY: &str = "view-root";
/// Family of [`Panel`].
pub const PANEL_FAMILY: &str = "panel";
/// Family of [`Output`].
pub const OUTPUT_FAMILY: &str = "output";
/// Family of [`Input`].
pub const INPUT_FAMILY: &str = "input";

/// Properties shared by every standard component.
fn base(family: &str) -> ComponentClass {
    ComponentClass::new(family)
        .with_property(
            PropertyDescriptor::new("rendered")
                .with_default(true)
                .tracked(),
        )
        .with_property(PropertyDescriptor::new("style_class"))
}

/// The root of a view.
#[derive(Clone, Copy, Debug, Default)]
pub struct ViewRoot;

impl ComponentType for ViewRoot {
    fn describe() -> ComponentClass {
        base(VIEW_ROOT_FAMILY)
            .with_property(PropertyDescriptor::new("locale").literal_only())
            .with_property(
                PropertyDescriptor::new("render_kit_id")
                    .with_default("html")
                    .literal_only()
                    .tracked(),
            )
            .with_property(PropertyDescriptor::new("view_id").literal_only())
    }
}

/// A container grouping its children.
#[derive(Clone, Copy, Debug, Default)]
pub struct Panel;

impl ComponentType for Panel {
    fn describe() -> ComponentClass {
        base(PANEL_FAMILY).with_property(
            PropertyDescriptor::new("layout")
                .with_default("block")
                .tracked(),
        )
    }
}

/// A component displaying a value.
#[derive(Clone, Copy, Debug, Default)]
pub struct Output;

impl ComponentType for Output {
    fn describe() -> ComponentClass {
        base(OUTPUT_FAMILY)
            .with_property(PropertyDescriptor::new("value"))
            .with_property(PropertyDescriptor::new("escape").with_default(true).tracked())
    }
}

/// A component accepting a submitted value.
#[derive(Clone, Copy, Debug, Default)]
pub struct Input;

impl ComponentType for Input {
    fn describe() -> ComponentClass {
        base(INPUT_FAMILY)
            .with_property(PropertyDescriptor::new("value"))
            .with_property(PropertyDescriptor::new("submitted_value"))
            .with_property(PropertyDescriptor::new("required").with_default(false).tracked())
            .with_property(PropertyDescriptor::new("valid").with_default(true).tracked())
            .with_property(PropertyDescriptor::list("validators"))
            .with_property(
                PropertyDescriptor::map("pass_through").with_default(Value::empty_map()),
            )
    }
}
