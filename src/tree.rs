//! In-memory tree representation (spec §2a, §9 Design Notes): an
//! arena-and-index store, the way the original's `ToTree` sink builds a
//! `NodeContainer` graph of `shared_ptr<Node>` but flattened into index
//! arithmetic instead of reference-counted pointers.

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::hash::HashType;
use crate::record::{LeafValue, ID_INVALID};
use crate::sink::{ContainerFlags, ContainerFooter, ContainerMeta, StreamSink};

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub enum NodeData {
    Leaf(LeafValue),
    Container {
        flags: ContainerFlags,
        children: Vec<NodeId>,
        hash_function: Option<HashType>,
        validated: Option<bool>,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: u64,
    pub parent: Option<NodeId>,
    pub data: NodeData,
}

impl Node {
    pub fn is_container(&self) -> bool {
        matches!(self.data, NodeData::Container { .. })
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.data {
            NodeData::Container { children, .. } => children,
            NodeData::Leaf(_) => &[],
        }
    }
}

/// An arena of [`Node`]s reachable from a single root container.
///
/// Lookup by object id is a linear scan of a container's direct children
/// rather than a side index: spec §2a only requires duplicate ids to
/// round-trip, not O(1) lookup, and a side index would need upkeep on every
/// insert this crate doesn't otherwise need.
#[derive(Debug, Clone)]
pub struct Tree {
    arena: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Creates a tree with a single, empty root container.
    pub fn new(root_flags: ContainerFlags) -> Self {
        let root = Node {
            id: ID_INVALID,
            parent: None,
            data: NodeData::Container {
                flags: root_flags,
                children: Vec::new(),
                hash_function: None,
                validated: None,
            },
        };
        Self {
            arena: alloc::vec![root],
            root: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, node: NodeId) -> Option<&Node> {
        self.arena.get(node)
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut Node> {
        self.arena.get_mut(node)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Every direct child of `parent` whose id equals `id`, in document order.
    pub fn find_by_id(&self, parent: NodeId, id: u64) -> impl Iterator<Item = NodeId> + '_ {
        self.arena
            .get(parent)
            .map(|n| n.children())
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(move |&child| self.arena[child].id == id)
    }

    fn push_child(&mut self, parent: NodeId, child: NodeId) {
        if let NodeData::Container { children, .. } = &mut self.arena[parent].data {
            children.push(child);
        }
    }

    pub fn insert_leaf(&mut self, parent: NodeId, id: u64, value: LeafValue) -> NodeId {
        let node_id = self.arena.len();
        self.arena.push(Node {
            id,
            parent: Some(parent),
            data: NodeData::Leaf(value),
        });
        self.push_child(parent, node_id);
        node_id
    }

    pub fn insert_container(&mut self, parent: NodeId, id: u64, flags: ContainerFlags) -> NodeId {
        let node_id = self.arena.len();
        self.arena.push(Node {
            id,
            parent: Some(parent),
            data: NodeData::Container {
                flags,
                children: Vec::new(),
                hash_function: None,
                validated: None,
            },
        });
        self.push_child(parent, node_id);
        node_id
    }

    /// Depth-first, pre-order traversal starting at `start`.
    pub fn walk(&self, start: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = alloc::vec![start];
        core::iter::from_fn(move || {
            let next = stack.pop()?;
            if let Some(node) = self.arena.get(next) {
                for &child in node.children().iter().rev() {
                    stack.push(child);
                }
            }
            Some(next)
        })
    }
}

/// A [`StreamSink`] that materializes every event into a [`Tree`], grounded
/// on `streaming_tree.cpp`'s `ToTree`.
#[derive(Debug)]
pub struct TreeSink {
    tree: Tree,
    stack: Vec<NodeId>,
}

impl TreeSink {
    pub fn new() -> Self {
        let tree = Tree::new(ContainerFlags::default());
        let root = tree.root();
        Self {
            tree,
            stack: alloc::vec![root],
        }
    }

    /// Consumes the sink, returning the tree it built. Panics if called
    /// before a matching `end_of_stream`/`end_container` unwound back to the
    /// root — indicates a driver bug, not malformed input.
    pub fn into_tree(self) -> Tree {
        assert_eq!(self.stack.len(), 1, "TreeSink consumed before all containers were closed");
        self.tree
    }
}

impl Default for TreeSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSink for TreeSink {
    fn start_container(&mut self, meta: &ContainerMeta) -> Result<bool> {
        let parent = *self.stack.last().ok_or(Error::NestMisuse)?;
        let node = self.tree.insert_container(parent, meta.id, meta.flags);
        self.stack.push(node);
        Ok(true)
    }

    fn push_node(&mut self, id: u64, value: LeafValue) -> Result<bool> {
        let parent = *self.stack.last().ok_or(Error::NestMisuse)?;
        self.tree.insert_leaf(parent, id, value);
        Ok(true)
    }

    fn end_container(&mut self, footer: &ContainerFooter) -> Result<bool> {
        if self.stack.len() <= 1 {
            return Err(Error::UnexpectedEndOfChildren);
        }
        let node = self.stack.pop().expect("checked above");
        if let NodeData::Container { hash_function, validated, .. } = &mut self.tree.get_mut(node).expect("just pushed").data {
            *hash_function = footer.hash_function;
            *validated = footer.validated;
        }
        Ok(true)
    }
}
