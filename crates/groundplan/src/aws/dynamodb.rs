//! DynamoDB infrastructure.

use crate::{
    aws::lambda::FunctionHandle,
    stack::Stack,
    tree::{attr_token, Attrs, Kind, NodeId},
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AttributeType {
    Binary,
    Number,
    String,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Binary => "B",
            AttributeType::Number => "N",
            AttributeType::String => "S",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BillingMode {
    #[default]
    PayPerRequest,
    Provisioned {
        read_capacity: u32,
        write_capacity: u32,
    },
}

/// A table declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub partition_key: (String, AttributeType),
    pub billing_mode: BillingMode,
}

impl Table {
    pub fn new(key_name: impl Into<String>, key_type: AttributeType) -> Self {
        Table {
            partition_key: (key_name.into(), key_type),
            billing_mode: BillingMode::default(),
        }
    }

    pub fn create(self, stack: &mut Stack, logical_id: impl Into<String>) -> Result<TableHandle> {
        let root = stack.root();
        let mut attrs = Attrs::from([
            (
                "partition_key_name".to_owned(),
                serde_json::json!(self.partition_key.0),
            ),
            (
                "partition_key_type".to_owned(),
                serde_json::json!(self.partition_key.1.as_str()),
            ),
        ]);
        match self.billing_mode {
            BillingMode::PayPerRequest => {
                attrs.insert("billing_mode".to_owned(), serde_json::json!("PAY_PER_REQUEST"));
            }
            BillingMode::Provisioned {
                read_capacity,
                write_capacity,
            } => {
                attrs.insert("billing_mode".to_owned(), serde_json::json!("PROVISIONED"));
                attrs.insert("read_capacity".to_owned(), serde_json::json!(read_capacity));
                attrs.insert("write_capacity".to_owned(), serde_json::json!(write_capacity));
            }
        }
        let node = stack.add_node(root, Kind::Table, logical_id, attrs)?;
        let path = stack.tree().path_of(node);
        Ok(TableHandle {
            assembly_id: stack.assembly_id(),
            node,
            logical_id: stack.tree().node(node).logical_id().to_owned(),
            name: attr_token(&path, "table_name"),
            arn: attr_token(&path, "arn"),
        })
    }
}

/// Handle to a declared table.
#[derive(Clone, Debug)]
pub struct TableHandle {
    assembly_id: u64,
    node: NodeId,
    logical_id: String,
    name: String,
    arn: String,
}

impl TableHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Token for the table's physical name, resolved at deployment. Typically
    /// passed to functions through their environment.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// Grant a managed function's execution identity write access to this
    /// table, scoped to this table only.
    ///
    /// This is the only way a caller can wire data access: the function's
    /// role is private to its bundle, so the grant goes through the table
    /// side and the opaque function handle.
    pub fn grant_write_data(&self, stack: &mut Stack, function: &FunctionHandle) -> Result<()> {
        stack.ensure_same_assembly(self.assembly_id, Kind::Table, &self.logical_id, "table")?;
        stack.ensure_same_assembly(
            function.assembly_id(),
            Kind::Table,
            &self.logical_id,
            "function",
        )?;
        function.role().attach_statement(
            stack,
            &[
                "dynamodb:BatchWriteItem",
                "dynamodb:PutItem",
                "dynamodb:UpdateItem",
                "dynamodb:DeleteItem",
            ],
            &self.arn,
        );
        Ok(())
    }
}
