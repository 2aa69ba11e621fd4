//! Policy aspects.
//!
//! An aspect is a visitor applied uniformly to every node in a completed tree
//! to enforce a cross-cutting policy, without each resource kind knowing about
//! the policy. Aspects run exactly once per assembly, after the tree is fully
//! built and sealed, in registration order.
//!
//! A visit may inspect a node's kind and attributes and may set or overwrite
//! attributes. It cannot add, remove, or reparent nodes: [`NodeView`] exposes
//! no topology at all, and the sealed tree rejects any insertion with
//! [`Error::TopologyMutation`](crate::Error::TopologyMutation).

use crate::tree::{Kind, Node, Tree};

/// Attribute name carrying the teardown hint consumed by the provisioning
/// backend at destroy time.
pub const REMOVAL_POLICY_ATTR: &str = "removal_policy";

/// The view of a node an aspect receives.
///
/// Each visit must be self-contained given only this view; aspects must not
/// assume any other node has already been visited.
pub struct NodeView<'a> {
    path: String,
    node: &'a mut Node,
}

impl<'a> NodeView<'a> {
    pub(crate) fn new(path: String, node: &'a mut Node) -> Self {
        NodeView { path, node }
    }

    pub fn kind(&self) -> Kind {
        self.node.kind()
    }

    pub fn logical_id(&self) -> &str {
        self.node.logical_id()
    }

    /// The node's `/`-joined logical path from the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn attr(&self, key: &str) -> Option<&serde_json::Value> {
        self.node.attr(key)
    }

    /// Set or overwrite an attribute on this node.
    pub fn set_attr(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.node.set_attr(key, value);
    }
}

/// A cross-cutting policy over the construct tree.
///
/// Implementations should be idempotent: applying the same aspect twice must
/// leave attribute state identical to applying it once.
pub trait Aspect {
    fn visit(&self, node: &mut NodeView<'_>);
}

/// Run every aspect over the tree, in registration order, each in a full
/// pre-order pass.
pub(crate) fn apply(tree: &mut Tree, aspects: &[Box<dyn Aspect>]) {
    let order = tree.pre_order();
    for aspect in aspects {
        for id in &order {
            let path = tree.path_of(*id);
            let mut view = NodeView::new(path, tree.node_mut(*id));
            aspect.visit(&mut view);
        }
    }
}

/// Marks every resource that supports a removal policy for destruction at
/// stack teardown. Useful for dev and/or test environments; never register
/// this on a production stack.
#[derive(Debug, Default)]
pub struct DestroyPolicyAspect;

impl Aspect for DestroyPolicyAspect {
    fn visit(&self, node: &mut NodeView<'_>) {
        if node.kind().supports_removal_policy() {
            node.set_attr(REMOVAL_POLICY_ATTR, serde_json::json!("destroy"));
        }
    }
}
