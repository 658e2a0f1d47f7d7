//! Saving a view at the end of one request and restoring it at the start of
//! the next.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use smol_str::SmolStr;
use viewstate_core::saved::SavedValue;
use viewstate_core::std_components::{Input, Output, Panel};
use viewstate_core::{
    Component, ComponentClass, ComponentTree, HolderRegistry, Node, PropertyDescriptor,
    RestoreError, StateContext, StateHolder, TreeState, Value,
};

/// Counts visits to a view, tracking changes once marked.
#[derive(Clone, Debug, Default)]
struct Visits {
    count: i64,
    marked: bool,
    changed: bool,
}

impl Visits {
    fn visit(&mut self) {
        self.count += 1;
        self.changed = true;
    }
}

impl StateHolder for Visits {
    fn type_name(&self) -> SmolStr {
        "visits".into()
    }

    fn save_state(&self, _ctx: &StateContext) -> Option<SavedValue> {
        (!self.marked || self.changed).then_some(SavedValue::Int(self.count))
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
                self.changed = self.marked;
                Ok(())
            }
            Some(other) => Err(RestoreError::unexpected("a visit count", other)),
        }
    }

    fn initial_state_marked(&self) -> bool {
        self.marked
    }

    fn mark_initial_state(&mut self) {
        self.marked = true;
        self.changed = false;
    }

    fn clear_initial_state(&mut self) {
        self.marked = false;
    }
}

#[fixture]
fn ctx() -> StateContext {
    let mut registry = HolderRegistry::new();
    registry.register_default::<Visits>();
    StateContext::new(registry)
}

struct Page {
    tree: ComponentTree,
    title: Node,
    name: Node,
}

/// Builds the page the way every request does, then marks its baseline.
fn build_page() -> Page {
    let mut tree = ComponentTree::default();
    let root = tree.root();
    let form = tree.add_node(Component::of::<Panel>().with_id("form"));
    let title = tree.add_node(Component::of::<Output>().with_id("title"));
    let name = tree.add_node(Component::of::<Input>().with_id("name"));
    tree.add_child(root, form).unwrap();
    tree.put_facet(form, "header", title).unwrap();
    tree.add_child(form, name).unwrap();

    tree.get_mut(title)
        .state_mut()
        .put("value", "Welcome".into());
    tree.get_mut(name).listeners_mut().push(Visits::default());
    tree.mark_initial_state(root);
    tree.drain_events().for_each(drop);
    Page { tree, title, name }
}

/// Ends a request: saves the page and serializes the state.
fn end_request(page: &Page, ctx: &StateContext) -> String {
    let state = page.tree.process_save_state(page.tree.root(), ctx).unwrap();
    state.validate().unwrap();
    serde_json::to_string(&state).unwrap()
}

/// Starts a request: rebuilds the page and replays the saved state.
fn start_request(saved: &str, ctx: &StateContext) -> Page {
    let state: TreeState = serde_json::from_str(saved).unwrap();
    let mut page = build_page();
    let root = page.tree.root();
    page.tree.process_restore_state(root, ctx, &state).unwrap();
    page
}

fn visits(page: &Page) -> i64 {
    let listener = page.tree.get(page.name).listeners().get(0).unwrap();
    listener.downcast_ref::<Visits>().unwrap().count
}

#[rstest]
fn changes_survive_two_requests(ctx: StateContext) {
    let mut page = build_page();
    let name = page.tree.get_mut(page.name);
    name.set_attribute("value", "ada".into()).unwrap();
    name.set_attribute("placeholder", "Your name".into()).unwrap();
    name.state_mut().add("validators", "required".into());
    name.listeners_mut()
        .get_mut(0)
        .and_then(|l| l.downcast_mut::<Visits>())
        .unwrap()
        .visit();
    let first = end_request(&page, &ctx);

    let mut page = start_request(&first, &ctx);
    let name = page.tree.get(page.name);
    assert_eq!(name.attribute(&ctx, "value"), Some("ada".into()));
    assert_eq!(name.attribute(&ctx, "placeholder"), Some("Your name".into()));
    assert_eq!(
        name.get("validators"),
        Some(&Value::List(vec!["required".into()]))
    );
    assert_eq!(visits(&page), 1);

    // The second request only changes the title, yet its state still
    // carries the first request's changes.
    page.tree
        .get_mut(page.title)
        .state_mut()
        .put("value", "Welcome back".into());
    let second = end_request(&page, &ctx);
    let page = start_request(&second, &ctx);
    assert_eq!(
        page.tree.get(page.title).get("value"),
        Some(&Value::from("Welcome back"))
    );
    assert_eq!(
        page.tree.get(page.name).get("value"),
        Some(&Value::from("ada"))
    );
    assert_eq!(visits(&page), 1);
}

#[rstest]
fn an_untouched_page_saves_no_node_state(ctx: StateContext) {
    let page = build_page();
    let state: TreeState = serde_json::from_str(&end_request(&page, &ctx)).unwrap();
    let summary = state.summary();
    assert_eq!(summary.nodes, 4);
    assert_eq!(summary.unchanged_nodes, 4);
}

#[rstest]
fn deletions_are_distinct_from_absence(ctx: StateContext) {
    let mut page = build_page();
    page.tree.get_mut(page.title).state_mut().remove("value");
    let saved = end_request(&page, &ctx);
    let state: TreeState = serde_json::from_str(&saved).unwrap();
    assert_eq!(state.summary().deletions, 1);

    let page = start_request(&saved, &ctx);
    assert_eq!(page.tree.get(page.title).get("value"), None);
    assert_eq!(
        page.tree.get(page.name).get("value"),
        None,
        "untouched keys stay absent"
    );
}

#[rstest]
fn changes_back_to_the_default_are_not_saved(ctx: StateContext) {
    let class = Arc::new(
        ComponentClass::new("greeting")
            .with_property(PropertyDescriptor::new("value").with_default("A").tracked()),
    );
    let mut tree = ComponentTree::new(Component::new(class));
    let root = tree.root();
    tree.get_mut(root).state_mut().put("value", "A".into());
    tree.mark_initial_state(root);

    tree.get_mut(root).state_mut().put("value", "B".into());
    tree.get_mut(root).state_mut().put("value", "A".into());
    let state = tree.process_save_state(root, &ctx).unwrap();
    assert_eq!(state.state, None);
}

#[rstest]
fn a_tampered_state_is_refused(ctx: StateContext) {
    let page = build_page();
    let saved = end_request(&page, &ctx);
    let mut state: TreeState = serde_json::from_str(&saved).unwrap();
    state.children.clear();

    let mut page = build_page();
    let root = page.tree.root();
    assert_eq!(
        page.tree.process_restore_state(root, &ctx, &state),
        Err(RestoreError::ChildCountMismatch {
            saved: 0,
            present: 1
        })
    );

    let malformed = r#"{"state": {"mode": "delta", "properties": ["value"]}}"#;
    assert!(serde_json::from_str::<TreeState>(malformed).is_err());
}
