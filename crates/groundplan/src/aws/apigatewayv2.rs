//! ApiGatewayV2 infrastructure.

use crate::{
    aws::{
        lambda::FunctionHandle,
        logs::{LogGroup, Retention},
        APIGATEWAY_PRINCIPAL,
    },
    stack::{Grant, Grantee, Stack},
    tree::{attr_token, Attrs, Kind, NodeId},
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access log line format, one field per request attribute of interest.
fn access_log_format() -> serde_json::Value {
    serde_json::json!({
        "requestId": "$context.requestId",
        "userAgent": "$context.identity.userAgent",
        "sourceIp": "$context.identity.sourceIp",
        "requestTime": "$context.requestTime",
        "httpMethod": "$context.httpMethod",
        "path": "$context.path",
        "status": "$context.status",
        "responseLength": "$context.responseLength",
    })
}

/// An HTTP API gateway.
pub struct HttpApi;

impl HttpApi {
    /// Declare the gateway together with its access-log destination: a
    /// vended-logs group the gateway's service principal is granted write
    /// access to, scoped to that group only.
    pub fn create(stack: &mut Stack, logical_id: impl Into<String>) -> Result<ApiHandle> {
        let logical_id = logical_id.into();

        let access_logs = LogGroup {
            log_group_name: format!("/aws/vendedlogs/{logical_id}Logs"),
            retention: Retention::OneWeek,
        }
        .create(stack, format!("{logical_id}Logs"))?;
        access_logs.grant_write(stack, APIGATEWAY_PRINCIPAL)?;

        let root = stack.root();
        let node = stack.add_node(
            root,
            Kind::Api,
            logical_id.clone(),
            Attrs::from([
                ("protocol".to_owned(), serde_json::json!("HTTP")),
                (
                    "access_log_destination".to_owned(),
                    serde_json::json!(access_logs.arn()),
                ),
                ("access_log_format".to_owned(), access_log_format()),
            ]),
        )?;
        let path = stack.tree().path_of(node);
        Ok(ApiHandle {
            assembly_id: stack.assembly_id(),
            node,
            logical_id,
            endpoint: attr_token(&path, "endpoint"),
            arn: attr_token(&path, "arn"),
        })
    }
}

/// Handle to a declared HTTP API.
#[derive(Clone, Debug)]
pub struct ApiHandle {
    assembly_id: u64,
    node: NodeId,
    logical_id: String,
    endpoint: String,
    arn: String,
}

impl ApiHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Token for the externally reachable entry-point address, resolved at
    /// deployment. This is the value a stack surfaces as its output.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Bind an HTTP method and path to a managed function.
    ///
    /// Produces exactly one route node carrying the integration (proxy to the
    /// target function), and grants the gateway's service principal
    /// permission to invoke that function only.
    ///
    /// ## Errors
    /// Errs with [`Error::InvalidAttributes`](crate::Error::InvalidAttributes)
    /// if `target` was created by a different assembly pass - routes may only
    /// reference functions declared in the same one.
    pub fn add_route(
        &self,
        stack: &mut Stack,
        method: Method,
        path: impl Into<String>,
        target: &FunctionHandle,
    ) -> Result<NodeId> {
        let path = path.into();
        let route_id = format!("{}-{}-{}", self.logical_id, method, sanitize_path(&path));
        stack.ensure_same_assembly(self.assembly_id, Kind::Route, &route_id, "api")?;
        stack.ensure_same_assembly(
            target.assembly_id(),
            Kind::Route,
            &route_id,
            "target function",
        )?;

        let node = stack.add_node(
            self.node,
            Kind::Route,
            route_id,
            Attrs::from([
                ("method".to_owned(), serde_json::json!(method.as_str())),
                ("path".to_owned(), serde_json::json!(path)),
                (
                    "integration_type".to_owned(),
                    serde_json::json!("AWS_PROXY"),
                ),
                ("target".to_owned(), serde_json::json!(target.arn())),
            ]),
        )?;

        // The integration implies the gateway may invoke this one function.
        stack.record_grant(Grant {
            grantee: Grantee::ServicePrincipal {
                service: APIGATEWAY_PRINCIPAL.to_owned(),
            },
            actions: vec!["lambda:InvokeFunction".to_owned()],
            resource: target.arn().to_owned(),
        });
        Ok(node)
    }
}

fn sanitize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "root".to_owned()
    } else {
        trimmed.replace('/', "-").replace(['{', '}'], "")
    }
}
