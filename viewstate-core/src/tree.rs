//! The component tree.
//!
//! Components are stored in an arena. Every node belongs to at most one
//! container: the ordered children list of its parent, or a named facet slot
//! of its owner. Attaching a node anywhere first takes it out of the
//! container holding it, so the parent reference of a node always names the
//! single container it sits in.
//!
//! Nodes whose chain of parents reaches the root are *in view*. Attaching or
//! detaching a subtree queues a [`TreeEvent`] for every node that enters or
//! leaves the view. Re-adding a node where it already sits does nothing and
//! queues nothing.

use itertools::Itertools;
use portgraph::hierarchy::AttachError;
use portgraph::{
    Hierarchy, NodeIndex, PortGraph, PortMut, PortView, SecondaryMap, UnmanagedDenseMap,
};
use smol_str::SmolStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::array_map::ArrayMap;
use crate::component::Component;
use crate::context::StateContext;
use crate::core::Node;
use crate::saved::{RestoreError, TreeState};
use crate::std_components::ViewRoot;

/// A change of the set of nodes in view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TreeEvent {
    /// The node became connected to the root.
    AddedToView(Node),
    /// The node is no longer connected to the root.
    RemovedFromView(Node),
}

/// Errors that can occur when changing the structure of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TreeError {
    /// The new parent is the node itself or one of its descendants.
    #[error("cannot attach {node} under {parent}, which is part of its subtree")]
    Cycle {
        /// The node being attached.
        node: Node,
        /// The requested parent.
        parent: Node,
    },
    /// The root cannot have a parent.
    #[error("the root {0} cannot be attached to another node")]
    RootAttach(Node),
    /// A child index is past the end of the children list.
    #[error("index {index} is out of bounds for {len} children")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The number of children.
        len: usize,
    },
    /// Facet names must not be empty.
    #[error("facet names must not be empty")]
    EmptyFacetName,
    /// The hierarchy refused the attachment.
    #[error(transparent)]
    Attach(#[from] AttachError),
}

/// A tree of components connected by children lists and facet slots.
#[derive(Clone, Debug)]
pub struct ComponentTree {
    /// Allocates node indices.
    graph: PortGraph,
    /// Parent and ordered children of every node in a children list.
    hierarchy: Hierarchy,
    /// The root node.
    root: NodeIndex,
    /// The component at each node.
    components: UnmanagedDenseMap<NodeIndex, Component>,
    /// The facet slots of each node.
    facets: UnmanagedDenseMap<NodeIndex, ArrayMap<SmolStr, Node>>,
    /// The owner of each node sitting in a facet slot.
    facet_owner: UnmanagedDenseMap<NodeIndex, Option<Node>>,
    /// Events not yet handed out by [`ComponentTree::drain_events`].
    events: Vec<TreeEvent>,
}

impl Default for ComponentTree {
    fn default() -> Self {
        Self::new(Component::of::<ViewRoot>())
    }
}

impl ComponentTree {
    /// Creates a tree holding only a root.
    #[must_use]
    pub fn new(root: Component) -> Self {
        let mut graph = PortGraph::new();
        let root_index = graph.add_node(0, 0);
        let mut components = UnmanagedDenseMap::new();
        components[root_index] = root;
        Self {
            graph,
            hierarchy: Hierarchy::new(),
            root: root_index,
            components,
            facets: UnmanagedDenseMap::new(),
            facet_owner: UnmanagedDenseMap::new(),
            events: Vec::new(),
        }
    }

    /// The root node.
    #[inline]
    #[must_use]
    pub fn root(&self) -> Node {
        self.root.into()
    }

    /// Returns `true` if the node exists in the tree.
    #[inline]
    #[must_use]
    pub fn contains(&self, node: Node) -> bool {
        self.graph.contains_node(node.into_portgraph())
    }

    /// The number of nodes, including detached ones.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// The component at a node.
    ///
    /// # Panics
    ///
    /// If the node is not in the tree.
    #[must_use]
    pub fn get(&self, node: Node) -> &Component {
        self.panic_invalid_node(node);
        &self.components[node.into_portgraph()]
    }

    /// The component at a node, for writing.
    ///
    /// # Panics
    ///
    /// If the node is not in the tree.
    pub fn get_mut(&mut self, node: Node) -> &mut Component {
        self.panic_invalid_node(node);
        &mut self.components[node.into_portgraph()]
    }

    /// The node holding `node` in its children list or in one of its facets.
    #[must_use]
    pub fn parent(&self, node: Node) -> Option<Node> {
        if !self.contains(node) {
            return None;
        }
        match self.hierarchy.parent(node.into_portgraph()) {
            Some(parent) => Some(parent.into()),
            None => self.facet_owner[node.into_portgraph()],
        }
    }

    /// The children of a node, in order.
    ///
    /// # Panics
    ///
    /// If the node is not in the tree.
    pub fn children(&self, node: Node) -> impl DoubleEndedIterator<Item = Node> + Clone + '_ {
        self.panic_invalid_node(node);
        self.hierarchy.children(node.into_portgraph()).map_into()
    }

    /// The number of children of a node.
    #[must_use]
    pub fn child_count(&self, node: Node) -> usize {
        self.panic_invalid_node(node);
        self.hierarchy.child_count(node.into_portgraph())
    }

    /// The child at `index`.
    #[must_use]
    pub fn child_at(&self, node: Node, index: usize) -> Option<Node> {
        self.children(node).nth(index)
    }

    /// The node in a facet slot.
    #[must_use]
    pub fn facet(&self, node: Node, name: &str) -> Option<Node> {
        self.panic_invalid_node(node);
        self.facets[node.into_portgraph()].get(name).copied()
    }

    /// The facets of a node, in the order they were first put.
    ///
    /// # Panics
    ///
    /// If the node is not in the tree.
    pub fn facets(&self, node: Node) -> impl DoubleEndedIterator<Item = (&SmolStr, Node)> + '_ {
        self.panic_invalid_node(node);
        self.facets[node.into_portgraph()]
            .iter()
            .map(|(name, facet)| (name, *facet))
    }

    /// The number of facets of a node.
    #[must_use]
    pub fn facet_count(&self, node: Node) -> usize {
        self.panic_invalid_node(node);
        self.facets[node.into_portgraph()].len()
    }

    /// The name of the facet slot holding a node.
    #[must_use]
    pub fn facet_name(&self, node: Node) -> Option<&SmolStr> {
        let owner = self.facet_owner[node.into_portgraph()]?;
        self.facets[owner.into_portgraph()].key_of(&node)
    }

    /// The node and everything below it, each node before its facets and
    /// its facets before its children.
    ///
    /// # Panics
    ///
    /// If the node is not in the tree.
    pub fn descendants(&self, node: Node) -> Descendants<'_> {
        self.panic_invalid_node(node);
        Descendants {
            tree: self,
            stack: vec![node],
        }
    }

    /// Returns `true` if the node is connected to the root.
    #[must_use]
    pub fn is_in_view(&self, node: Node) -> bool {
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current == self.root()
    }

    /// Takes the queued events, oldest first.
    pub fn drain_events(&mut self) -> impl Iterator<Item = TreeEvent> + '_ {
        self.events.drain(..)
    }

    /// The queued events, oldest first.
    #[must_use]
    pub fn pending_events(&self) -> &[TreeEvent] {
        &self.events
    }

    /// Adds a detached node holding `component`.
    pub fn add_node(&mut self, component: Component) -> Node {
        let index = self.graph.add_node(0, 0);
        self.components[index] = component;
        self.facets[index] = ArrayMap::new();
        self.facet_owner[index] = None;
        index.into()
    }

    /// Appends `child` to the children of `parent`.
    ///
    /// A child already at the end of the list stays where it is. A node
    /// moved within the same parent does not leave the view.
    ///
    /// # Panics
    ///
    /// If either node is not in the tree.
    pub fn add_child(&mut self, parent: Node, child: Node) -> Result<(), TreeError> {
        self.check_attach(child, parent)?;
        let (parent_index, child_index) = (parent.into_portgraph(), child.into_portgraph());
        if self.hierarchy.children(parent_index).next_back() == Some(child_index) {
            return Ok(());
        }
        let same_parent = self.prepare_move(child, parent);
        self.hierarchy.push_child(child_index, parent_index)?;
        self.linked(child, same_parent);
        Ok(())
    }

    /// Inserts `child` at position `index` of the children of `parent`.
    ///
    /// The index counts the children without `child` itself, so moving a
    /// child within its list cannot run past the end. A child already at
    /// `index` stays where it is.
    ///
    /// # Panics
    ///
    /// If either node is not in the tree.
    pub fn insert_child(
        &mut self,
        parent: Node,
        index: usize,
        child: Node,
    ) -> Result<(), TreeError> {
        self.check_attach(child, parent)?;
        let (parent_index, child_index) = (parent.into_portgraph(), child.into_portgraph());
        let in_list = self.hierarchy.parent(child_index) == Some(parent_index);
        let len = self.child_count(parent) - usize::from(in_list);
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }
        if in_list && self.child_at(parent, index) == Some(child) {
            return Ok(());
        }

        let same_parent = self.prepare_move(child, parent);
        match self.child_at(parent, index) {
            Some(before) => self
                .hierarchy
                .insert_before(child_index, before.into_portgraph())?,
            None => self.hierarchy.push_child(child_index, parent_index)?,
        }
        self.linked(child, same_parent);
        Ok(())
    }

    /// Replaces the child at position `index` with `child`, returning the
    /// replaced node, now detached.
    ///
    /// # Panics
    ///
    /// If either node is not in the tree.
    pub fn set_child(&mut self, parent: Node, index: usize, child: Node) -> Result<Node, TreeError> {
        self.check_attach(child, parent)?;
        let Some(replaced) = self.child_at(parent, index) else {
            return Err(TreeError::IndexOutOfBounds {
                index,
                len: self.child_count(parent),
            });
        };
        if replaced == child {
            return Ok(child);
        }
        let same_parent = self.prepare_move(child, parent);
        self.hierarchy
            .insert_before(child.into_portgraph(), replaced.into_portgraph())?;
        self.unlink(replaced);
        self.linked(child, same_parent);
        Ok(replaced)
    }

    /// Detaches `child` if it is a child of `parent`.
    ///
    /// # Panics
    ///
    /// If `parent` is not in the tree.
    pub fn remove_child(&mut self, parent: Node, child: Node) -> bool {
        self.panic_invalid_node(parent);
        if !self.contains(child)
            || self.hierarchy.parent(child.into_portgraph()) != Some(parent.into_portgraph())
        {
            return false;
        }
        self.unlink(child);
        true
    }

    /// Detaches the child at position `index`.
    pub fn remove_child_at(&mut self, parent: Node, index: usize) -> Option<Node> {
        let child = self.child_at(parent, index)?;
        self.unlink(child);
        Some(child)
    }

    /// Detaches every child of `parent`, returning them in order.
    pub fn clear_children(&mut self, parent: Node) -> Vec<Node> {
        let children = self.children(parent).collect_vec();
        for &child in &children {
            self.unlink(child);
        }
        children
    }

    /// Puts `node` into the facet slot `name` of `owner`, returning the node
    /// it displaced, now detached.
    ///
    /// A node already in that slot stays where it is and `None` is returned.
    ///
    /// # Panics
    ///
    /// If either node is not in the tree.
    pub fn put_facet(
        &mut self,
        owner: Node,
        name: impl Into<SmolStr>,
        node: Node,
    ) -> Result<Option<Node>, TreeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TreeError::EmptyFacetName);
        }
        self.check_attach(node, owner)?;
        let displaced = self.facet(owner, &name);
        if displaced == Some(node) {
            return Ok(None);
        }
        let same_parent = self.prepare_move(node, owner);
        if let Some(displaced) = displaced {
            self.unlink(displaced);
        }
        self.facets[owner.into_portgraph()].insert(name, node);
        self.facet_owner[node.into_portgraph()] = Some(owner);
        self.linked(node, same_parent);
        Ok(displaced)
    }

    /// Detaches the node in the facet slot `name` of `owner`.
    pub fn remove_facet(&mut self, owner: Node, name: &str) -> Option<Node> {
        let node = self.facet(owner, name)?;
        self.unlink(node);
        Some(node)
    }

    /// Takes a node out of the container holding it, returning the node
    /// that held it.
    ///
    /// # Panics
    ///
    /// If the node is not in the tree.
    pub fn detach(&mut self, node: Node) -> Option<Node> {
        self.panic_invalid_node(node);
        let parent = self.parent(node);
        self.unlink(node);
        parent
    }

    /// Removes a node and everything below it from the tree.
    ///
    /// # Panics
    ///
    /// If the node is the root or not in the tree.
    pub fn remove_subtree(&mut self, node: Node) {
        self.panic_invalid_node(node);
        assert!(node != self.root(), "Cannot remove the root {node}.");
        self.unlink(node);
        for n in self.descendants(node).collect_vec() {
            let index = n.into_portgraph();
            self.hierarchy.remove(index);
            self.graph.remove_node(index);
            self.components.take(index);
            self.facets.take(index);
            self.facet_owner.take(index);
        }
    }

    /// Marks the baseline of every component of a subtree.
    pub fn mark_initial_state(&mut self, node: Node) {
        let nodes = self.descendants(node).collect_vec();
        for &n in &nodes {
            self.components[n.into_portgraph()].mark_initial_state();
        }
        debug!(%node, nodes = nodes.len(), "marked subtree baseline");
    }

    /// Drops the baseline of every component of a subtree.
    pub fn clear_initial_state(&mut self, node: Node) {
        for n in self.descendants(node).collect_vec() {
            self.components[n.into_portgraph()].clear_initial_state();
        }
    }

    /// Saves a subtree. Transient components and everything below them are
    /// left out, so a transient `node` saves as `None`.
    #[must_use]
    pub fn process_save_state(&self, node: Node, ctx: &StateContext) -> Option<TreeState> {
        let component = self.get(node);
        if component.is_transient() {
            return None;
        }
        Some(TreeState {
            state: component.save_state(ctx),
            facets: self
                .facets(node)
                .filter_map(|(name, facet)| {
                    Some((name.clone(), self.process_save_state(facet, ctx)?))
                })
                .collect(),
            children: self
                .children(node)
                .filter_map(|child| self.process_save_state(child, ctx))
                .collect(),
        })
    }

    /// Restores a subtree saved by [`ComponentTree::process_save_state`].
    ///
    /// Children are matched by position among the non-transient children,
    /// facets by name. Facets without saved state are kept as they are.
    /// Nothing changes if the restore fails.
    pub fn process_restore_state(
        &mut self,
        node: Node,
        ctx: &StateContext,
        state: &TreeState,
    ) -> Result<(), RestoreError> {
        let mut restored = Vec::new();
        self.restore_into(node, ctx, state, &mut restored)?;
        debug!(%node, changed = restored.len(), "restored subtree state");
        for (n, component) in restored {
            self.components[n.into_portgraph()] = component;
        }
        Ok(())
    }

    fn restore_into(
        &self,
        node: Node,
        ctx: &StateContext,
        state: &TreeState,
        restored: &mut Vec<(Node, Component)>,
    ) -> Result<(), RestoreError> {
        let component = self.get(node);
        if component.is_transient() {
            return Ok(());
        }
        if let Some(component) = component.restored(ctx, state.state.as_ref())? {
            restored.push((node, component));
        }

        for (name, facet) in self.facets(node) {
            if self.get(facet).is_transient() {
                continue;
            }
            match state.facets.get(name) {
                Some(facet_state) => self.restore_into(facet, ctx, facet_state, restored)?,
                None => warn!(%node, facet = %name, "no saved state for facet"),
            }
        }
        for name in state.facets.keys() {
            if self.facet(node, name).is_none() {
                warn!(%node, facet = %name, "saved state for a missing facet");
            }
        }

        let children = self
            .children(node)
            .filter(|&child| !self.get(child).is_transient())
            .collect_vec();
        if children.len() != state.children.len() {
            return Err(RestoreError::ChildCountMismatch {
                saved: state.children.len(),
                present: children.len(),
            });
        }
        for (child, child_state) in children.into_iter().zip(&state.children) {
            self.restore_into(child, ctx, child_state, restored)?;
        }
        Ok(())
    }

    #[track_caller]
    fn panic_invalid_node(&self, node: Node) {
        assert!(self.contains(node), "Received an invalid node {node}.");
    }

    /// Checks that `node` may be attached below `parent`.
    #[track_caller]
    fn check_attach(&self, node: Node, parent: Node) -> Result<(), TreeError> {
        self.panic_invalid_node(node);
        self.panic_invalid_node(parent);
        if node == self.root() {
            return Err(TreeError::RootAttach(node));
        }
        let mut current = Some(parent);
        while let Some(n) = current {
            if n == node {
                return Err(TreeError::Cycle { node, parent });
            }
            current = self.parent(n);
        }
        Ok(())
    }

    /// Takes a node out of its container without queueing events.
    fn take_out(&mut self, node: Node) {
        let index = node.into_portgraph();
        if self.hierarchy.parent(index).is_some() {
            self.hierarchy.detach(index);
        } else if let Some(owner) = self.facet_owner[index].take() {
            self.facets[owner.into_portgraph()].retain(|_, facet| *facet != node);
        }
    }

    /// Takes a node out of its container, queueing removal events if it was
    /// in view.
    fn unlink(&mut self, node: Node) {
        let in_view = node != self.root() && self.is_in_view(node);
        self.take_out(node);
        if in_view {
            self.queue_subtree(node, TreeEvent::RemovedFromView);
        }
    }

    /// Takes a node out of its container before attaching it under
    /// `parent`. Returns `true` if the node stays under the same parent, in
    /// which case no events are queued.
    fn prepare_move(&mut self, node: Node, parent: Node) -> bool {
        let same_parent = self.parent(node) == Some(parent);
        if same_parent {
            self.take_out(node);
        } else {
            self.unlink(node);
        }
        same_parent
    }

    /// Queues the events of a node that was just attached.
    fn linked(&mut self, node: Node, same_parent: bool) {
        if !same_parent && self.is_in_view(node) {
            self.queue_subtree(node, TreeEvent::AddedToView);
        }
    }

    fn queue_subtree(&mut self, node: Node, event: fn(Node) -> TreeEvent) {
        let nodes = self.descendants(node).map(event).collect_vec();
        self.events.extend(nodes);
    }
}

/// Iterator over a subtree, created by [`ComponentTree::descendants`].
#[derive(Clone, Debug)]
pub struct Descendants<'a> {
    tree: &'a ComponentTree,
    stack: Vec<Node>,
}

impl Iterator for Descendants<'_> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let node = self.stack.pop()?;
        self.stack.extend(self.tree.children(node).rev());
        self.stack
            .extend(self.tree.facets(node).rev().map(|(_, facet)| facet));
        Some(node)
    }
}
