//! Arena-backed task tree
//!
//! Nodes live in a single `Vec` and are addressed by [`NodeId`], so planned
//! operations can point into the tree without copying labels around. Arena
//! order is insertion order; builders that add a node before its children
//! (the parser does) get arena order == pre-order for free, but nothing
//! downstream relies on that: traversal always goes through [`TaskTree::pre_order`].

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Index of a node inside its owning [`TaskTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Errors raised when a caller hands the tree an id it did not issue
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Task label must not be empty")]
    EmptyLabel,
}

/// One unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskNode {
    label: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
    external_ref: Option<String>,
}

impl TaskNode {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Zero for roots
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Tracker key, present only once the node's ticket was created
    pub fn external_ref(&self) -> Option<&str> {
        self.external_ref.as_deref()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Ordered forest of tasks extracted from one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTree {
    nodes: Vec<TaskNode>,
    roots: Vec<NodeId>,
}

impl TaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a root node; labels are trimmed and must be non-empty
    pub fn add_root(&mut self, label: &str) -> Result<NodeId, TreeError> {
        let id = self.push(label, None, 0)?;
        self.roots.push(id);
        Ok(id)
    }

    /// Append a child under `parent`, after any existing children
    pub fn add_child(&mut self, parent: NodeId, label: &str) -> Result<NodeId, TreeError> {
        let depth = self.node(parent).ok_or(TreeError::UnknownNode(parent))?.depth + 1;
        let id = self.push(label, Some(parent), depth)?;
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    fn push(&mut self, label: &str, parent: Option<NodeId>, depth: usize) -> Result<NodeId, TreeError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(TreeError::EmptyLabel);
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(TaskNode {
            label: label.to_string(),
            parent,
            children: Vec::new(),
            depth,
            external_ref: None,
        });
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&TaskNode> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Total number of nodes at every depth
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deepest level present, `None` for an empty tree
    pub fn max_depth(&self) -> Option<usize> {
        self.nodes.iter().map(|n| n.depth).max()
    }

    /// Every node, parents before children, siblings in extraction order
    pub fn pre_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.node(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    /// Labels from the root down to `id`
    pub fn path(&self, id: NodeId) -> Vec<&str> {
        let mut labels = Vec::new();
        let mut cursor = self.node(id);
        while let Some(node) = cursor {
            labels.push(node.label.as_str());
            cursor = node.parent.and_then(|p| self.node(p));
        }
        labels.reverse();
        labels
    }

    /// True if `ancestor` lies on the path from a root to `id` (exclusive)
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = self.node(id).and_then(|n| n.parent);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.node(current).and_then(|n| n.parent);
        }
        false
    }

    pub(crate) fn set_external_ref(&mut self, id: NodeId, external_ref: impl Into<String>) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(id.0).ok_or(TreeError::UnknownNode(id))?;
        node.external_ref = Some(external_ref.into());
        debug!(%id, external_ref = ?node.external_ref, "TaskTree::set_external_ref");
        Ok(())
    }

    /// Render back to the nested hierarchy shape the model produces
    ///
    /// A node whose children are all leaves becomes a list of labels; any
    /// other node becomes an object, with leaf children mapped to `[]`.
    pub fn to_json(&self) -> serde_json::Value {
        self.children_json(&self.roots)
    }

    fn children_json(&self, ids: &[NodeId]) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for id in ids {
            if let Some(node) = self.node(*id) {
                map.insert(node.label.clone(), self.node_json(node));
            }
        }
        serde_json::Value::Object(map)
    }

    fn node_json(&self, node: &TaskNode) -> serde_json::Value {
        let all_leaves = node
            .children
            .iter()
            .filter_map(|c| self.node(*c))
            .all(TaskNode::is_leaf);
        if all_leaves {
            serde_json::Value::Array(
                node.children
                    .iter()
                    .filter_map(|c| self.node(*c))
                    .map(|c| serde_json::Value::String(c.label.clone()))
                    .collect(),
            )
        } else {
            self.children_json(&node.children)
        }
    }
}

impl Serialize for TaskTree {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}
