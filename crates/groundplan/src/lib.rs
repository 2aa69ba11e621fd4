//! # Groundplan
//!
//! Groundplan is a library for declaring cloud infrastructure as a construct
//! tree: a rooted, ordered tree of typed resource nodes assembled in one
//! synchronous pass and then handed off, fully formed, to an external
//! provisioning backend.
//!
//! ## Key Features
//!
//! - **Construct Tree**: every declared resource is a node with a logical id,
//!   a closed [`Kind`](tree::Kind), and provider-specific attributes. Sibling
//!   ids are unique, the tree is append-only, and traversal order is
//!   deterministic (pre-order, children in insertion order).
//! - **Policy Aspects**: cross-cutting policies implemented as visitors that
//!   are run once over the completed tree, uniformly across heterogeneous
//!   resource kinds. See [`aspect`].
//! - **Managed Functions**: a single declarative [`FunctionSpec`][fs] expands
//!   into a coordinated log group, least-privilege execution role, and compute
//!   function behind one opaque handle. See [`aws::lambda`].
//!
//! [fs]: aws::lambda::FunctionSpec
//!
//! ## Concepts
//!
//! Groundplan separates assembly from provisioning:
//!
//! - **Assembly**: a [`Stack`](stack::Stack) builds the tree in-process. No
//!   I/O happens here; construction is a pure function of its
//!   [`StackConfig`](config::StackConfig) inputs. Any failure aborts the whole
//!   pass - a partially built graph is never observable.
//! - **Synthesis**: [`Stack::synth`](stack::Stack::synth) seals the tree,
//!   applies registered aspects exactly once, and renders a
//!   [`Template`](stack::Template) for the provisioning backend. Values that
//!   only exist after deployment (ARNs, endpoints) are carried as reference
//!   tokens of the form `${path.attr}` and resolved by that backend.
//!
//! An example assembly lives in the `person-service` binary crate, and
//! `src/test.rs` demonstrates the library's primitives directly.
//!
//! ## Error Handling
//!
//! All fallible operations return a `Result` with the crate-wide [`Error`]
//! enum. Construction-time errors are fail-fast: nothing is retried and no
//! partial tree is ever handed to an aspect or to the backend.

use snafu::prelude::*;

pub mod aspect;
pub mod aws;
pub mod config;
pub mod stack;
#[cfg(test)]
mod test;
pub mod tree;

pub use aspect::Aspect;
pub use config::{Stage, StackConfig};
pub use stack::{Grant, Grantee, Stack, Template};
pub use tree::{Kind, NodeId};

/// Top-level error enum that encompasses all errors.
#[derive(snafu::Snafu, Debug)]
pub enum Error {
    #[snafu(display("Duplicate logical id '{logical_id}' among the children of '{parent}'"))]
    DuplicateId { parent: String, logical_id: String },

    #[snafu(display("Invalid attributes for {kind} '{logical_id}': {reason}"))]
    InvalidAttributes {
        kind: tree::Kind,
        logical_id: String,
        reason: String,
    },

    #[snafu(display(
        "Topology mutation rejected: cannot add '{logical_id}' to a sealed tree \
        (aspects are running or synthesis has begun)"
    ))]
    TopologyMutation { logical_id: String },

    #[snafu(display(
        "Missing packaging artifact for function '{function_name}': expected {path:?} to exist"
    ))]
    MissingPackagingArtifact {
        function_name: String,
        path: std::path::PathBuf,
    },

    #[snafu(display(
        "Destructive teardown cannot be enabled on stage '{stage}'; \
        ephemeral stacks are for non-production stages only"
    ))]
    ProductionTeardown { stage: config::Stage },

    #[snafu(display("Could not serialize '{name}': {source}"))]
    Serialize {
        name: String,
        source: serde_json::Error,
    },
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
