//! Lambda infrastructure: the managed function.
//!
//! A [`FunctionSpec`] is a short declarative input that expands into a
//! coordinated bundle of nodes under one derived name: the function's log
//! group, a least-privilege execution role, and the function itself. Only the
//! resulting [`FunctionHandle`] is exposed; the log group and role are owned
//! exclusively by the bundle, and all cross-bundle wiring happens through
//! narrow grant helpers against the handle.

use std::collections::BTreeMap;

use crate::{
    aws::{
        iam::{self, Role, RoleHandle},
        logs::{LogGroup, Retention},
        LAMBDA_PRINCIPAL,
    },
    stack::Stack,
    tree::{attr_token, Attrs, Kind, NodeId},
    Result,
};

/// Default log level every managed function starts with. Applied first, so a
/// caller supplying the same key wins.
const DEFAULT_ENV: (&str, &str) = ("RUST_LOG", "info");

const HANDLER: &str = "bootstrap";
const RUNTIME: &str = "provided.al2023";
const ARCHITECTURE: &str = "arm64";

/// Declarative input for a managed function.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FunctionSpec {
    /// Short name; the deployed name is `{stack}-{name}` and the packaging
    /// artifact is located by convention at `{asset_dir}/{name}`.
    pub name: String,
    pub environment: BTreeMap<String, String>,
    pub memory_mb: Option<u32>,
    pub timeout_secs: Option<u32>,
}

impl FunctionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionSpec {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

/// Merge caller-supplied environment with the fixed defaults. Defaults are
/// inserted first; caller entries second, so the caller wins on a key
/// collision and the result is the union otherwise.
pub(crate) fn merged_environment(caller: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut env = BTreeMap::from([(DEFAULT_ENV.0.to_owned(), DEFAULT_ENV.1.to_owned())]);
    env.extend(caller.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Builder for the managed function bundle.
pub struct ManagedFunction;

impl ManagedFunction {
    /// Materialize the bundle from `spec`.
    ///
    /// Creates, under the derived name `{stack}-{spec.name}`:
    /// - the function's log group, with retention selected by the stack's
    ///   stage (short on dev, longer elsewhere),
    /// - an execution role assumable only by the Lambda service principal,
    ///   whose inline policy grants exactly the three logging actions scoped
    ///   to that log group - never a wildcard,
    /// - the function node, referencing the packaging artifact at
    ///   `{asset_dir}/{spec.name}` and the merged environment.
    ///
    /// Whether the artifact actually exists is checked at synthesis, not
    /// here.
    pub fn create(stack: &mut Stack, spec: FunctionSpec) -> Result<FunctionHandle> {
        let derived = format!("{}-{}", stack.config().name, spec.name);
        log::debug!("managed function '{derived}'");

        let log_group = LogGroup {
            log_group_name: format!("/aws/lambda/{derived}"),
            retention: Retention::for_stage(stack.config().stage),
        }
        .create(stack, format!("{derived}LogGroup"))?;

        let role = Role {
            assume_role_policy: iam::service_assume_role_policy(LAMBDA_PRINCIPAL),
            statements: vec![iam::policy_statement(
                &[
                    "logs:CreateLogGroup",
                    "logs:CreateLogStream",
                    "logs:PutLogEvents",
                ],
                log_group.arn(),
            )],
        }
        .create(stack, format!("{derived}Role"))?;

        let code_path = stack.config().asset_dir.join(&spec.name);
        let mut attrs = Attrs::from([
            ("function_name".to_owned(), serde_json::json!(derived)),
            ("handler".to_owned(), serde_json::json!(HANDLER)),
            ("runtime".to_owned(), serde_json::json!(RUNTIME)),
            ("architecture".to_owned(), serde_json::json!(ARCHITECTURE)),
            (
                "code_path".to_owned(),
                serde_json::json!(code_path.to_string_lossy()),
            ),
            ("role".to_owned(), serde_json::json!(role.arn())),
            ("log_group".to_owned(), serde_json::json!(log_group.arn())),
            (
                "environment".to_owned(),
                serde_json::json!(merged_environment(&spec.environment)),
            ),
        ]);
        if let Some(memory_mb) = spec.memory_mb {
            attrs.insert("memory_mb".to_owned(), serde_json::json!(memory_mb));
        }
        if let Some(timeout_secs) = spec.timeout_secs {
            attrs.insert("timeout_secs".to_owned(), serde_json::json!(timeout_secs));
        }

        let root = stack.root();
        let node = stack.add_node(root, Kind::Function, format!("{derived}Lambda"), attrs)?;
        let path = stack.tree().path_of(node);
        Ok(FunctionHandle {
            assembly_id: stack.assembly_id(),
            node,
            log_group_node: log_group.node(),
            role,
            function_name: derived,
            arn: attr_token(&path, "arn"),
        })
    }
}

/// The one handle a bundle exposes.
///
/// The role and log group stay private: reaching into a bundle's internals
/// from outside this crate is a compile error, so the bundle never silently
/// grants access to resources outside itself and nothing outside the bundle
/// can widen its role.
#[derive(Clone, Debug)]
pub struct FunctionHandle {
    assembly_id: u64,
    node: NodeId,
    log_group_node: NodeId,
    role: RoleHandle,
    function_name: String,
    arn: String,
}

impl FunctionHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The derived deployed name, `{stack}-{spec.name}`.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Token for the function's ARN, resolved at deployment.
    pub fn arn(&self) -> &str {
        &self.arn
    }

    pub(crate) fn assembly_id(&self) -> u64 {
        self.assembly_id
    }

    pub(crate) fn role(&self) -> &RoleHandle {
        &self.role
    }

    pub(crate) fn log_group_node(&self) -> NodeId {
        self.log_group_node
    }
}
