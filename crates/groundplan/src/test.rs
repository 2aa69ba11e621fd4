use pretty_assertions::assert_eq;

use crate::{
    aspect::{self, Aspect, DestroyPolicyAspect, NodeView, REMOVAL_POLICY_ATTR},
    aws::{
        apigatewayv2::{HttpApi, Method},
        dynamodb::{AttributeType, Table},
        lambda::{self, FunctionSpec, ManagedFunction},
        logs::Retention,
    },
    config::{Stage, StackConfig},
    stack::{Grantee, Stack},
    tree::{Attrs, Kind, Tree},
    Error,
};

fn test_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("groundplan-{}-{name}", std::process::id()))
}

/// An asset directory containing a packaging artifact for each named
/// function, the way the build-time collaborator would have left them.
fn asset_dir_with(name: &str, functions: &[&str]) -> std::path::PathBuf {
    let dir = test_dir(name);
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    for function in functions {
        std::fs::create_dir_all(dir.join(function)).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn dev_config(name: &str, test_name: &str, functions: &[&str]) -> StackConfig {
    StackConfig::new(name).with_asset_dir(asset_dir_with(test_name, functions))
}

#[test]
fn traversal_order_is_deterministic() {
    let _ = env_logger::builder().try_init();

    let mut tree = Tree::new("app");
    let root = tree.root();
    let a = tree.add_node(root, Kind::Api, "a", api_attrs()).unwrap();
    tree.add_node(root, Kind::Output, "b", output_attrs()).unwrap();
    tree.add_node(a, Kind::Route, "a1", route_attrs()).unwrap();
    tree.add_node(a, Kind::Route, "a2", route_attrs()).unwrap();

    let ids = |tree: &Tree| {
        let mut ids = vec![];
        tree.for_each(|node| ids.push(node.logical_id().to_owned()));
        ids
    };
    let first = ids(&tree);
    assert_eq!(
        vec!["app", "a", "a1", "a2", "b"],
        first,
        "pre-order: parent first, children in insertion order"
    );
    assert_eq!(first, ids(&tree), "re-running traversal yields the same sequence");
}

fn api_attrs() -> Attrs {
    Attrs::from([("protocol".to_owned(), serde_json::json!("HTTP"))])
}

fn route_attrs() -> Attrs {
    Attrs::from([
        ("method".to_owned(), serde_json::json!("GET")),
        ("path".to_owned(), serde_json::json!("/")),
        ("target".to_owned(), serde_json::json!("${fn.arn}")),
    ])
}

fn output_attrs() -> Attrs {
    Attrs::from([("value".to_owned(), serde_json::json!("v"))])
}

#[test]
fn duplicate_sibling_id_is_rejected_without_partial_insertion() {
    let _ = env_logger::builder().try_init();

    let mut tree = Tree::new("app");
    let root = tree.root();
    tree.add_node(root, Kind::Api, "api", api_attrs()).unwrap();
    let before = tree.len();

    let err = tree.add_node(root, Kind::Api, "api", api_attrs()).unwrap_err();
    assert!(matches!(err, Error::DuplicateId { .. }), "got {err}");
    assert_eq!(before, tree.len(), "failed insertion must leave the tree unchanged");

    // The same id under a *different* parent is fine; uniqueness is a
    // sibling-level invariant.
    let other_parent = tree
        .add_node(root, Kind::Api, "api2", api_attrs())
        .unwrap();
    tree.add_node(other_parent, Kind::Route, "api", route_attrs())
        .unwrap();
}

#[test]
fn required_attributes_are_validated_per_kind() {
    let _ = env_logger::builder().try_init();

    let mut tree = Tree::new("app");
    let root = tree.root();

    // Table without a partition key.
    let err = tree
        .add_node(root, Kind::Table, "t", Attrs::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAttributes { .. }), "got {err}");

    // Bad partition key type.
    let err = tree
        .add_node(
            root,
            Kind::Table,
            "t",
            Attrs::from([
                ("partition_key_name".to_owned(), serde_json::json!("id")),
                ("partition_key_type".to_owned(), serde_json::json!("X")),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAttributes { .. }), "got {err}");

    // A well-formed table passes.
    tree.add_node(
        root,
        Kind::Table,
        "t",
        Attrs::from([
            ("partition_key_name".to_owned(), serde_json::json!("id")),
            ("partition_key_type".to_owned(), serde_json::json!("S")),
        ]),
    )
    .unwrap();

    // Route missing its target.
    let err = tree
        .add_node(
            root,
            Kind::Route,
            "r",
            Attrs::from([
                ("method".to_owned(), serde_json::json!("GET")),
                ("path".to_owned(), serde_json::json!("/")),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAttributes { .. }), "got {err}");
}

fn attribute_snapshot(tree: &Tree) -> Vec<(String, Attrs)> {
    tree.pre_order()
        .into_iter()
        .map(|id| (tree.path_of(id), tree.node(id).attrs().clone()))
        .collect()
}

#[test]
fn destroy_policy_aspect_is_idempotent() {
    let _ = env_logger::builder().try_init();

    let mut stack = Stack::new(dev_config("app", "idempotent", &["f"])).unwrap();
    Table::new("id", AttributeType::String)
        .create(&mut stack, "table")
        .unwrap();
    ManagedFunction::create(&mut stack, FunctionSpec::new("f")).unwrap();

    let aspects: Vec<Box<dyn Aspect>> = vec![Box::new(DestroyPolicyAspect)];
    aspect::apply(stack.tree_mut(), &aspects);
    let once = attribute_snapshot(stack.tree());
    aspect::apply(stack.tree_mut(), &aspects);
    let twice = attribute_snapshot(stack.tree());
    assert_eq!(once, twice, "re-application must not change attribute state");

    // The policy landed where it should and nowhere else.
    stack.tree().for_each(|node| {
        let marked = node.attr(REMOVAL_POLICY_ATTR) == Some(&serde_json::json!("destroy"));
        assert_eq!(
            node.kind().supports_removal_policy(),
            marked,
            "{} '{}'",
            node.kind(),
            node.logical_id()
        );
    });
}

#[test]
fn aspects_only_see_attributes() {
    let _ = env_logger::builder().try_init();

    // An aspect that stamps every node it can see; exercises the NodeView
    // surface (kind, path, attr, set_attr) and nothing else, because nothing
    // else exists.
    struct Stamp;
    impl Aspect for Stamp {
        fn visit(&self, node: &mut NodeView<'_>) {
            if node.attr("stamp").is_none() && node.kind() != Kind::Stack {
                let path = node.path().to_owned();
                node.set_attr("stamp", serde_json::json!(path));
            }
        }
    }

    let mut stack = Stack::new(dev_config("app", "stamp", &[])).unwrap();
    Table::new("id", AttributeType::String)
        .create(&mut stack, "table")
        .unwrap();
    stack.register_aspect(Stamp);
    let template = stack.synth().unwrap();
    let table = &template.resources[0];
    assert_eq!(
        Some(&serde_json::json!("app/table")),
        table.attributes.get("stamp")
    );
}

#[test]
fn function_environment_merge_caller_wins() {
    let caller = std::collections::BTreeMap::from([
        ("RUST_LOG".to_owned(), "debug".to_owned()),
        ("TABLE_NAME".to_owned(), "t".to_owned()),
    ]);
    assert_eq!(
        std::collections::BTreeMap::from([
            ("RUST_LOG".to_owned(), "debug".to_owned()),
            ("TABLE_NAME".to_owned(), "t".to_owned()),
        ]),
        lambda::merged_environment(&caller),
        "caller overrides on key collision, union otherwise"
    );

    let no_override = std::collections::BTreeMap::from([("A".to_owned(), "1".to_owned())]);
    assert_eq!(
        std::collections::BTreeMap::from([
            ("A".to_owned(), "1".to_owned()),
            ("RUST_LOG".to_owned(), "info".to_owned()),
        ]),
        lambda::merged_environment(&no_override),
        "fixed default applies when the caller does not name its key"
    );
}

#[test]
fn managed_function_role_is_least_privilege() {
    let _ = env_logger::builder().try_init();

    let mut stack = Stack::new(dev_config("personService", "least-priv", &["add_person"])).unwrap();
    let table = Table::new("id", AttributeType::String)
        .create(&mut stack, "personsTable")
        .unwrap();
    let function = ManagedFunction::create(&mut stack, FunctionSpec::new("add_person")).unwrap();
    table.grant_write_data(&mut stack, &function).unwrap();

    let tree = stack.tree();
    let mut roles = 0;
    tree.for_each(|node| {
        if node.kind() != Kind::Role {
            return;
        }
        roles += 1;
        let statements = node.attr("policy").unwrap()["Statement"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(
            2,
            statements.len(),
            "one logging statement plus the table write grant"
        );
        for statement in &statements {
            let resources = statement["Resource"].as_array().unwrap();
            assert_eq!(1, resources.len(), "exactly one resource per statement");
            assert_ne!(
                "*",
                resources[0].as_str().unwrap(),
                "never a wildcard resource scope"
            );
        }
        assert_eq!(
            serde_json::json!(["${personService/personService-add_personLogGroup.arn}"]),
            statements[0]["Resource"],
            "logging is scoped to the bundle's own log group"
        );
    });
    assert_eq!(1, roles);
}

#[test]
fn route_requires_a_function_from_the_same_assembly() {
    let _ = env_logger::builder().try_init();

    let mut stack = Stack::new(dev_config("app", "route-same", &["f"])).unwrap();
    let mut other = Stack::new(dev_config("app", "route-other", &["f"])).unwrap();

    let function = ManagedFunction::create(&mut stack, FunctionSpec::new("f")).unwrap();
    let foreign = ManagedFunction::create(&mut other, FunctionSpec::new("f")).unwrap();

    let api = HttpApi::create(&mut stack, "api").unwrap();
    let nodes_before = stack.tree().len();
    let err = api
        .add_route(&mut stack, Method::Post, "/", &foreign)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAttributes { .. }), "got {err}");
    assert_eq!(nodes_before, stack.tree().len(), "no partial insertion");

    api.add_route(&mut stack, Method::Post, "/", &function).unwrap();
    let mut routes = 0;
    stack.tree().for_each(|node| {
        if node.kind() == Kind::Route {
            routes += 1;
        }
    });
    assert_eq!(1, routes, "exactly one route node per binding");
}

#[test]
fn sealed_tree_rejects_topology_mutation() {
    let _ = env_logger::builder().try_init();

    let mut stack = Stack::new(dev_config("app", "sealed", &[])).unwrap();
    Table::new("id", AttributeType::String)
        .create(&mut stack, "table")
        .unwrap();
    stack.prepare();

    let err = stack.output("late", "nope").unwrap_err();
    assert!(matches!(err, Error::TopologyMutation { .. }), "got {err}");
}

#[test]
fn ephemeral_teardown_is_refused_on_prod() {
    let err = Stack::new(
        StackConfig::new("app")
            .with_stage(Stage::Prod)
            .ephemeral(true),
    )
    .unwrap_err();
    assert!(matches!(err, Error::ProductionTeardown { .. }), "got {err}");

    // Opt-in works on non-production stages, and stays off by default.
    assert!(Stack::new(StackConfig::new("app").with_stage(Stage::Test).ephemeral(true)).is_ok());
    assert!(Stack::new(StackConfig::new("app").with_stage(Stage::Prod)).is_ok());
}

#[test]
fn log_retention_follows_stage() {
    assert_eq!(Retention::OneWeek, Retention::for_stage(Stage::Dev));
    assert_eq!(Retention::OneMonth, Retention::for_stage(Stage::Test));
    assert_eq!(Retention::OneMonth, Retention::for_stage(Stage::Prod));

    let mut stack = Stack::new(
        dev_config("app", "retention", &["f"]).with_stage(Stage::Test),
    )
    .unwrap();
    let function = ManagedFunction::create(&mut stack, FunctionSpec::new("f")).unwrap();
    let log_group = stack.tree().node(function.log_group_node());
    assert_eq!(Some(&serde_json::json!(30)), log_group.attr("retention_days"));
}

#[test]
fn ephemeral_stack_marks_every_resource_for_destruction() {
    let _ = env_logger::builder().try_init();

    let mut stack = Stack::new(dev_config("app", "ephemeral", &[]).ephemeral(true)).unwrap();
    Table::new("id", AttributeType::String)
        .create(&mut stack, "table")
        .unwrap();
    let api = HttpApi::create(&mut stack, "api").unwrap();
    stack.output("apiUrl", api.endpoint()).unwrap();

    let template = stack.synth().unwrap();
    for resource in &template.resources {
        assert_eq!(
            Some(&serde_json::json!("destroy")),
            resource.attributes.get(REMOVAL_POLICY_ATTR),
            "{} '{}' should be marked",
            resource.kind,
            resource.path
        );
    }
}

#[test]
fn synthesis_fails_fast_on_a_missing_packaging_artifact() {
    let _ = env_logger::builder().try_init();

    // No artifact for "f" in the asset dir.
    let mut stack = Stack::new(dev_config("app", "missing-artifact", &[])).unwrap();
    ManagedFunction::create(&mut stack, FunctionSpec::new("f")).unwrap();
    let err = stack.synth().unwrap_err();
    assert!(matches!(err, Error::MissingPackagingArtifact { .. }), "got {err}");
}

#[test]
fn person_service_end_to_end() {
    let _ = env_logger::builder().try_init();

    let mut stack = Stack::new(dev_config("personService", "e2e", &["add_person"])).unwrap();

    let table = Table::new("id", AttributeType::String)
        .create(&mut stack, "personsTable")
        .unwrap();
    let add_person = ManagedFunction::create(
        &mut stack,
        FunctionSpec::new("add_person").env("TABLE_NAME", table.name()),
    )
    .unwrap();
    table.grant_write_data(&mut stack, &add_person).unwrap();

    let api = HttpApi::create(&mut stack, "personApi").unwrap();
    api.add_route(&mut stack, Method::Post, "/", &add_person).unwrap();
    stack.output("apiUrl", api.endpoint()).unwrap();

    let template = stack.synth().unwrap();

    let count = |kind: Kind| {
        template
            .resources
            .iter()
            .filter(|resource| resource.kind == kind)
            .count()
    };
    assert_eq!(1, count(Kind::Table));
    assert_eq!(1, count(Kind::Function));
    assert_eq!(1, count(Kind::Role), "the bundle's role and nothing else");
    assert_eq!(
        2,
        count(Kind::LogGroup),
        "the bundle's log group plus the api access logs"
    );
    assert_eq!(1, count(Kind::Api));
    assert_eq!(1, count(Kind::Route));

    let role_grants: Vec<_> = template
        .grants
        .iter()
        .filter(|grant| matches!(grant.grantee, Grantee::Role { .. }))
        .collect();
    assert_eq!(
        1,
        role_grants.len(),
        "exactly one grant edge from the bundle's identity to the table"
    );
    assert_eq!("${personService/personsTable.arn}", role_grants[0].resource);

    assert_eq!(1, template.outputs.len());
    assert_eq!(
        Some(&serde_json::json!("${personService/personApi.endpoint}")),
        template.outputs.get("apiUrl"),
        "the single output records the api entry-point address"
    );

    // The function got the merged environment: caller TABLE_NAME plus the
    // fixed RUST_LOG default.
    let function = template
        .resources
        .iter()
        .find(|resource| resource.kind == Kind::Function)
        .unwrap();
    assert_eq!(
        Some(&serde_json::json!({
            "RUST_LOG": "info",
            "TABLE_NAME": "${personService/personsTable.table_name}",
        })),
        function.attributes.get("environment")
    );

    // Rendering the template is stable and round-trips.
    let json = template.to_json_string_pretty().unwrap();
    let back: crate::Template = serde_json::from_str(&json).unwrap();
    assert_eq!(template, back);
}
