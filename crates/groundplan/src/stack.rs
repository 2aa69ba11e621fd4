//! Stack assembly and synthesis.
//!
//! A [`Stack`] owns the construct tree for one assembly pass. Resources are
//! declared through the builders in [`crate::aws`], which hand back
//! lightweight handles tied to this stack; wiring between resources (routes,
//! grants) goes through those handles. When assembly is complete,
//! [`Stack::synth`] seals the tree, runs registered aspects once, and renders
//! the [`Template`] that is the sole artifact handed to the provisioning
//! backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use snafu::prelude::*;

use crate::{
    aspect::{self, Aspect, DestroyPolicyAspect},
    config::{Stage, StackConfig},
    tree::{Attrs, Kind, NodeId, Tree},
    Error, MissingPackagingArtifactSnafu, ProductionTeardownSnafu, Result, SerializeSnafu,
};

static NEXT_ASSEMBLY_ID: AtomicU64 = AtomicU64::new(0);

/// Who a permission is granted to.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grantee {
    /// An execution role declared in this tree, identified by logical path.
    Role { path: String },
    /// A provider service principal, e.g. `apigateway.amazonaws.com`.
    ServicePrincipal { service: String },
}

/// A directed, least-privilege permission edge from an identity to a
/// resource, scoped to a specific action set.
///
/// Grants are additive only: there is no mechanism to revoke a previously
/// issued grant within one assembly pass.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Grant {
    pub grantee: Grantee,
    pub actions: Vec<String>,
    /// Reference token of the target resource, never a wildcard.
    pub resource: String,
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("assembly_id", &self.assembly_id)
            .field("config", &self.config)
            .field("tree", &self.tree)
            .field("grants", &self.grants)
            .finish_non_exhaustive()
    }
}

/// The top-level assembly for one pass.
pub struct Stack {
    assembly_id: u64,
    config: StackConfig,
    tree: Tree,
    aspects: Vec<Box<dyn Aspect>>,
    grants: Vec<Grant>,
}

impl Stack {
    /// Start a new assembly pass.
    ///
    /// When `config.ephemeral` is set, the destructive teardown aspect is
    /// registered so every resource is marked for removal at stack deletion.
    ///
    /// ## Errors
    /// Errs with [`Error::ProductionTeardown`] if `config.ephemeral` is set
    /// while the stage is [`Stage::Prod`]; an irreversible teardown policy is
    /// opt-in and never allowed in production.
    pub fn new(config: StackConfig) -> Result<Self> {
        ensure!(
            !(config.ephemeral && config.stage == Stage::Prod),
            ProductionTeardownSnafu {
                stage: config.stage,
            }
        );
        let tree = Tree::new(config.name.clone());
        let mut stack = Stack {
            assembly_id: NEXT_ASSEMBLY_ID.fetch_add(1, Ordering::Relaxed),
            config,
            tree,
            aspects: vec![],
            grants: vec![],
        };
        if stack.config.ephemeral {
            log::info!(
                "stack '{}' is ephemeral, registering the destroy policy",
                stack.config.name
            );
            stack.register_aspect(DestroyPolicyAspect);
        }
        Ok(stack)
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    pub(crate) fn assembly_id(&self) -> u64 {
        self.assembly_id
    }

    /// Register an aspect to be applied to every node, after the tree is
    /// fully built. Aspects run in registration order.
    pub fn register_aspect(&mut self, aspect: impl Aspect + 'static) {
        self.aspects.push(Box::new(aspect));
    }

    pub(crate) fn add_node(
        &mut self,
        parent: NodeId,
        kind: Kind,
        logical_id: impl Into<String>,
        attrs: Attrs,
    ) -> Result<NodeId> {
        self.tree.add_node(parent, kind, logical_id, attrs)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut crate::tree::Node {
        self.tree.node_mut(id)
    }

    pub(crate) fn record_grant(&mut self, grant: Grant) {
        log::debug!(
            "granting {:?} -> {} ({})",
            grant.grantee,
            grant.resource,
            grant.actions.join(", ")
        );
        self.grants.push(grant);
    }

    /// Every cross-resource wire must reference a handle created in this same
    /// assembly pass; a dangling reference is a construction-time error.
    pub(crate) fn ensure_same_assembly(
        &self,
        handle_assembly_id: u64,
        kind: Kind,
        logical_id: &str,
        referenced: &str,
    ) -> Result<()> {
        if handle_assembly_id == self.assembly_id {
            Ok(())
        } else {
            Err(Error::InvalidAttributes {
                kind,
                logical_id: logical_id.to_owned(),
                reason: format!(
                    "referenced {referenced} was created by a different assembly pass"
                ),
            })
        }
    }

    /// Declare a stack output, an externally observable value surfaced for
    /// collaborators outside this system.
    pub fn output(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<NodeId> {
        let root = self.tree.root();
        self.tree.add_node(
            root,
            Kind::Output,
            name,
            Attrs::from([("value".to_owned(), serde_json::json!(value.into()))]),
        )
    }

    /// Seal the tree and run every registered aspect, in registration order.
    pub(crate) fn prepare(&mut self) {
        self.tree.seal();
        aspect::apply(&mut self.tree, &self.aspects);
    }

    /// Synthesize the completed tree into a [`Template`].
    ///
    /// Consumes the stack: aspects are applied exactly once and no further
    /// construction is possible. Each function's packaging artifact must
    /// exist at its conventional location by now; a build-time collaborator
    /// is expected to have produced it.
    ///
    /// ## Errors
    /// Errs with [`Error::MissingPackagingArtifact`] if a function node's
    /// `code_path` does not exist on disk.
    pub fn synth(mut self) -> Result<Template> {
        log::info!("synthesizing stack '{}'", self.config.name);
        self.prepare();

        let mut resources = vec![];
        let mut outputs = BTreeMap::new();
        for id in self.tree.pre_order() {
            let node = self.tree.node(id);
            match node.kind() {
                Kind::Stack => {}
                Kind::Output => {
                    let value = node
                        .attr("value")
                        .cloned()
                        .unwrap_or(serde_json::Value::Null);
                    outputs.insert(node.logical_id().to_owned(), value);
                }
                Kind::Function => {
                    let path = std::path::PathBuf::from(
                        node.attr("code_path").and_then(|v| v.as_str()).unwrap_or(""),
                    );
                    ensure!(
                        path.exists(),
                        MissingPackagingArtifactSnafu {
                            function_name: node.logical_id(),
                            path,
                        }
                    );
                    resources.push(RenderedResource {
                        path: self.tree.path_of(id),
                        kind: node.kind(),
                        attributes: node.attrs().clone(),
                    });
                }
                _ => resources.push(RenderedResource {
                    path: self.tree.path_of(id),
                    kind: node.kind(),
                    attributes: node.attrs().clone(),
                }),
            }
        }

        let template = Template {
            stack: self.config.name.clone(),
            stage: self.config.stage,
            resources,
            grants: self.grants,
            outputs,
        };
        log::info!("...synthesized\n{template}");
        Ok(template)
    }
}

/// One resource as handed to the provisioning backend.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderedResource {
    pub path: String,
    pub kind: Kind,
    pub attributes: Attrs,
}

/// The deployment plan input: the completed tree (aspects already applied),
/// grant edges, and outputs. One tree in, one deployment plan out.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Template {
    pub stack: String,
    pub stage: Stage,
    pub resources: Vec<RenderedResource>,
    pub grants: Vec<Grant>,
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl core::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "stack '{}' ({})", self.stack, self.stage)?;
        for resource in &self.resources {
            writeln!(f, "  {} '{}'", resource.kind, resource.path)?;
        }
        for grant in &self.grants {
            let grantee = match &grant.grantee {
                Grantee::Role { path } => path.as_str(),
                Grantee::ServicePrincipal { service } => service.as_str(),
            };
            writeln!(
                f,
                "  grant {} -> {} [{}]",
                grantee,
                grant.resource,
                grant.actions.join(", ")
            )?;
        }
        for (name, value) in &self.outputs {
            writeln!(f, "  output {name} = {value}")?;
        }
        Ok(())
    }
}

impl Template {
    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context(SerializeSnafu {
            name: self.stack.clone(),
        })
    }
}
