//! Definitions for the core types used in the component tree.
//!
//! These types are re-exported in the root of the crate.

use derive_more::From;

/// A handle to a component node in a [`ComponentTree`].
///
/// Handles are plain indices. A parent never owns its children through a
/// handle and a child refers to its parent only by index, so the tree has
/// no reference cycles.
///
/// [`ComponentTree`]: crate::tree::ComponentTree
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct Node {
    index: portgraph::NodeIndex,
}

impl Node {
    /// Returns the index of the node.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.index.index()
    }

    /// Returns the node as a portgraph `NodeIndex`.
    #[inline]
    pub(crate) fn into_portgraph(self) -> portgraph::NodeIndex {
        self.index
    }
}

impl From<Node> for portgraph::NodeIndex {
    fn from(node: Node) -> Self {
        node.into_portgraph()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Node").field(&self.index()).finish()
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.index())
    }
}

#[cfg(test)]
mod test {
    use super::Node;

    #[test]
    fn node_formatting() {
        let node: Node = portgraph::NodeIndex::new(7).into();
        assert_eq!(node.index(), 7);
        assert_eq!(format!("{node}"), "Node(7)");
        assert_eq!(format!("{node:?}"), "Node(7)");
    }
}
