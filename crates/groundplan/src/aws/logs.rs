//! CloudWatch Logs infrastructure.

use crate::{
    config::Stage,
    stack::{Grant, Grantee, Stack},
    tree::{attr_token, Attrs, Kind, NodeId},
    Result,
};

/// How long a log group retains events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Retention {
    OneWeek,
    OneMonth,
}

impl Retention {
    pub fn days(&self) -> u64 {
        match self {
            Retention::OneWeek => 7,
            Retention::OneMonth => 30,
        }
    }

    /// Short retention on dev, longer everywhere else. This is the only
    /// stage-sensitive branch in the whole assembly.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Dev => Retention::OneWeek,
            Stage::Test | Stage::Prod => Retention::OneMonth,
        }
    }
}

/// A log group declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct LogGroup {
    pub log_group_name: String,
    pub retention: Retention,
}

impl LogGroup {
    /// Declare the log group under the stack root.
    pub fn create(self, stack: &mut Stack, logical_id: impl Into<String>) -> Result<LogGroupHandle> {
        let root = stack.root();
        let node = stack.add_node(
            root,
            Kind::LogGroup,
            logical_id,
            Attrs::from([
                (
                    "log_group_name".to_owned(),
                    serde_json::json!(self.log_group_name),
                ),
                (
                    "retention_days".to_owned(),
                    serde_json::json!(self.retention.days()),
                ),
            ]),
        )?;
        let path = stack.tree().path_of(node);
        Ok(LogGroupHandle {
            assembly_id: stack.assembly_id(),
            node,
            logical_id: stack.tree().node(node).logical_id().to_owned(),
            arn: attr_token(&path, "arn"),
        })
    }
}

/// Handle to a declared log group.
#[derive(Clone, Debug)]
pub struct LogGroupHandle {
    assembly_id: u64,
    node: NodeId,
    logical_id: String,
    arn: String,
}

impl LogGroupHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Token for this log group's ARN, resolved at deployment.
    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// Allow a service principal to write log streams into this group,
    /// scoped to this group only.
    pub fn grant_write(&self, stack: &mut Stack, service: impl Into<String>) -> Result<()> {
        stack.ensure_same_assembly(self.assembly_id, Kind::LogGroup, &self.logical_id, "log group")?;
        stack.record_grant(Grant {
            grantee: Grantee::ServicePrincipal {
                service: service.into(),
            },
            actions: vec![
                "logs:CreateLogStream".to_owned(),
                "logs:PutLogEvents".to_owned(),
            ],
            resource: self.arn.clone(),
        });
        Ok(())
    }
}
