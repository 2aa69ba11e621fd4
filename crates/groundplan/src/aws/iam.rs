//! IAM infrastructure.

use crate::{
    stack::{Grant, Grantee, Stack},
    tree::{attr_token, Attrs, Kind, NodeId},
    Result,
};

/// A trust policy permitting only the given service principal to assume the
/// role.
pub fn service_assume_role_policy(service: &str) -> serde_json::Value {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": service },
                "Action": "sts:AssumeRole"
            }
        ]
    })
}

/// An allow statement scoped to exactly one resource. Least privilege: no
/// wildcard resource scope is ever emitted by this module.
pub fn policy_statement(actions: &[&str], resource: &str) -> serde_json::Value {
    serde_json::json!({
        "Effect": "Allow",
        "Action": actions,
        "Resource": [resource]
    })
}

pub fn policy_document(statements: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": statements
    })
}

/// An execution role declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct Role {
    /// Trust policy document.
    pub assume_role_policy: serde_json::Value,
    /// Initial inline policy statements.
    pub statements: Vec<serde_json::Value>,
}

impl Role {
    pub fn create(self, stack: &mut Stack, logical_id: impl Into<String>) -> Result<RoleHandle> {
        let root = stack.root();
        let node = stack.add_node(
            root,
            Kind::Role,
            logical_id,
            Attrs::from([
                (
                    "assume_role_policy".to_owned(),
                    self.assume_role_policy.clone(),
                ),
                ("policy".to_owned(), policy_document(self.statements)),
            ]),
        )?;
        let path = stack.tree().path_of(node);
        Ok(RoleHandle {
            node,
            arn: attr_token(&path, "arn"),
            path,
        })
    }
}

/// Handle to a declared role.
///
/// Deliberately has no public constructor or accessors beyond the ARN token:
/// only the components that own a role (within this crate) may extend its
/// policy, which keeps two callers from silently fighting over the same
/// role's configuration.
#[derive(Clone, Debug)]
pub struct RoleHandle {
    node: NodeId,
    path: String,
    arn: String,
}

impl RoleHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// Append an allow statement to the role's inline policy and record the
    /// grant edge. Grants are additive only.
    pub(crate) fn attach_statement(
        &self,
        stack: &mut Stack,
        actions: &[&str],
        resource: &str,
    ) {
        let statement = policy_statement(actions, resource);
        let node = stack.node_mut(self.node);
        let mut policy = node
            .attr("policy")
            .cloned()
            .unwrap_or_else(|| policy_document(vec![]));
        if let Some(statements) = policy
            .get_mut("Statement")
            .and_then(|s| s.as_array_mut())
        {
            statements.push(statement);
        }
        node.set_attr("policy", policy);
        stack.record_grant(Grant {
            grantee: Grantee::Role {
                path: self.path.clone(),
            },
            actions: actions.iter().map(|a| (*a).to_owned()).collect(),
            resource: resource.to_owned(),
        });
    }
}
