//! AWS-flavored resource builders over the construct tree.

pub mod apigatewayv2;
pub mod dynamodb;
pub mod iam;
pub mod lambda;
pub mod logs;

/// Service principal allowed to assume a function's execution role.
pub const LAMBDA_PRINCIPAL: &str = "lambda.amazonaws.com";

/// Service principal the API gateway writes access logs and invokes
/// integrations as.
pub const APIGATEWAY_PRINCIPAL: &str = "apigateway.amazonaws.com";
