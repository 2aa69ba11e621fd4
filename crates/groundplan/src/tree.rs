//! The construct tree.
//!
//! A rooted, ordered, append-only tree of resource nodes. Parent/child edges
//! express ownership and namespacing. Traversal is pre-order with children in
//! insertion order, and that ordering is a contract - aspects and synthesis
//! both rely on it being deterministic.

use std::collections::BTreeMap;

use snafu::prelude::*;

use crate::{DuplicateIdSnafu, InvalidAttributesSnafu, Result, TopologyMutationSnafu};

/// The closed set of resource kinds a node may have.
///
/// Policies pattern-match over this enum, so every kind a policy must handle
/// is enumerable at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Kind {
    /// The root of the tree.
    Stack,
    Function,
    LogGroup,
    Role,
    Table,
    Api,
    Route,
    Output,
}

impl core::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Kind::Stack => "stack",
            Kind::Function => "function",
            Kind::LogGroup => "log-group",
            Kind::Role => "role",
            Kind::Table => "table",
            Kind::Api => "api",
            Kind::Route => "route",
            Kind::Output => "output",
        })
    }
}

impl Kind {
    /// Whether the provisioning backend honors a removal policy hint on this
    /// kind. Outputs and the stack root are not provisioned resources.
    pub fn supports_removal_policy(&self) -> bool {
        !matches!(self, Kind::Stack | Kind::Output)
    }

    /// Validate the required attribute set for this kind.
    ///
    /// Returns a human-readable reason on failure. Attributes beyond the
    /// required set are provider-specific and pass through unchecked.
    fn validate(&self, attrs: &Attrs) -> core::result::Result<(), String> {
        fn require<'a>(
            attrs: &'a Attrs,
            key: &str,
        ) -> core::result::Result<&'a serde_json::Value, String> {
            attrs
                .get(key)
                .ok_or_else(|| format!("missing required attribute '{key}'"))
        }
        fn require_str<'a>(attrs: &'a Attrs, key: &str) -> core::result::Result<&'a str, String> {
            require(attrs, key)?
                .as_str()
                .ok_or_else(|| format!("attribute '{key}' must be a string"))
        }
        fn require_object(attrs: &Attrs, key: &str) -> core::result::Result<(), String> {
            if require(attrs, key)?.is_object() {
                Ok(())
            } else {
                Err(format!("attribute '{key}' must be an object"))
            }
        }

        match self {
            Kind::Stack => Ok(()),
            Kind::Function => {
                for key in [
                    "function_name",
                    "handler",
                    "runtime",
                    "code_path",
                    "role",
                    "log_group",
                ] {
                    require_str(attrs, key)?;
                }
                require_object(attrs, "environment")
            }
            Kind::LogGroup => {
                require_str(attrs, "log_group_name")?;
                require(attrs, "retention_days")?
                    .as_u64()
                    .map(drop)
                    .ok_or_else(|| "attribute 'retention_days' must be a number".to_owned())
            }
            Kind::Role => require_object(attrs, "assume_role_policy"),
            Kind::Table => {
                require_str(attrs, "partition_key_name")?;
                let ty = require_str(attrs, "partition_key_type")?;
                if matches!(ty, "S" | "N" | "B") {
                    Ok(())
                } else {
                    Err(format!(
                        "attribute 'partition_key_type' must be one of S, N, B (got '{ty}')"
                    ))
                }
            }
            Kind::Api => require_str(attrs, "protocol").map(drop),
            Kind::Route => {
                for key in ["method", "path", "target"] {
                    require_str(attrs, key)?;
                }
                Ok(())
            }
            Kind::Output => require(attrs, "value").map(drop),
        }
    }
}

/// Node attributes, provider-specific and rendered verbatim at synthesis.
///
/// A `BTreeMap` keeps rendering deterministic.
pub type Attrs = BTreeMap<String, serde_json::Value>;

/// A handle to a node within its [`Tree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeId(usize);

/// One declared resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    logical_id: String,
    kind: Kind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attrs: Attrs,
}

impl Node {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&serde_json::Value> {
        self.attrs.get(key)
    }

    /// Overwrite or insert an attribute.
    ///
    /// This is deliberately not exported outside the crate: callers holding a
    /// handle may read attributes but must route mutations through the owning
    /// component's API (or an aspect).
    pub(crate) fn set_attr(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attrs.insert(key.into(), value);
    }
}

/// A late-bound reference to an attribute of the node at `path`, resolved by
/// the provisioning backend after deployment.
pub fn attr_token(path: &str, attr: &str) -> String {
    format!("${{{path}.{attr}}}")
}

/// The construct tree.
///
/// Nodes live in an arena indexed by [`NodeId`]; the root is created with the
/// tree and every other node is appended under exactly one parent, assigned at
/// creation and never reassigned.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    sealed: bool,
}

impl Tree {
    /// Create a tree whose root is a [`Kind::Stack`] node named `root_id`.
    pub fn new(root_id: impl Into<String>) -> Self {
        Tree {
            nodes: vec![Node {
                logical_id: root_id.into(),
                kind: Kind::Stack,
                parent: None,
                children: vec![],
                attrs: Attrs::default(),
            }],
            sealed: false,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a node as the last child of `parent`.
    ///
    /// ## Errors
    /// - [`Error::TopologyMutation`] if the tree has been sealed.
    /// - [`Error::DuplicateId`] if `logical_id` collides with a sibling.
    /// - [`Error::InvalidAttributes`] if the required attributes for `kind`
    ///   are missing or malformed.
    ///
    /// All checks run before insertion, so a failed call leaves the tree
    /// unchanged.
    pub fn add_node(
        &mut self,
        parent: NodeId,
        kind: Kind,
        logical_id: impl Into<String>,
        attrs: Attrs,
    ) -> Result<NodeId> {
        let logical_id = logical_id.into();
        ensure!(
            !self.sealed,
            TopologyMutationSnafu {
                logical_id: logical_id.clone(),
            }
        );
        let collision = self.nodes[parent.0]
            .children
            .iter()
            .any(|child| self.nodes[child.0].logical_id == logical_id);
        ensure!(
            !collision,
            DuplicateIdSnafu {
                parent: self.nodes[parent.0].logical_id.clone(),
                logical_id: logical_id.clone(),
            }
        );
        kind.validate(&attrs).map_err(|reason| {
            InvalidAttributesSnafu {
                kind,
                logical_id: logical_id.clone(),
                reason,
            }
            .build()
        })?;

        let id = NodeId(self.nodes.len());
        log::debug!("adding {kind} node '{logical_id}'");
        self.nodes.push(Node {
            logical_id,
            kind,
            parent: Some(parent),
            children: vec![],
            attrs,
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// The `/`-joined logical path of a node from the root.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut segments = vec![self.nodes[id.0].logical_id.as_str()];
        let mut cursor = self.nodes[id.0].parent;
        while let Some(parent) = cursor {
            segments.push(self.nodes[parent.0].logical_id.as_str());
            cursor = self.nodes[parent.0].parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Node ids in pre-order: the root first, then each child's subtree in
    /// child-insertion order. Re-running this on an unchanged tree yields the
    /// identical sequence.
    pub fn pre_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut pending = vec![self.root()];
        while let Some(id) = pending.pop() {
            order.push(id);
            for child in self.nodes[id.0].children.iter().rev() {
                pending.push(*child);
            }
        }
        order
    }

    /// Visit every node in pre-order.
    pub fn for_each(&self, mut f: impl FnMut(&Node)) {
        for id in self.pre_order() {
            f(&self.nodes[id.0]);
        }
    }

    /// Freeze the topology. Attributes stay mutable (aspects run after
    /// sealing); any further [`Tree::add_node`] is rejected.
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}
