//! Invariants that hold for every environment and project

use std::collections::HashSet;

use hasura_infra_core::resource::{RemovalPolicy, Resource, Value};
use hasura_infra_stacks::credentials::SecretPolicy;
use hasura_infra_stacks::ingress::Route;
use hasura_infra_stacks::network::{
    POSTGRES_PORT, Protocol, RuleSource, TrustBoundary, VPC_CIDR, declare_boundaries,
    declare_network,
};
use hasura_infra_stacks::stack::Stack;
use hasura_infra_stacks::{ConfigBuilder, Topology, TopologyConfig, Unit};
use proptest::prelude::*;

fn config(environment: &str, project: &str, subdomain: &str) -> TopologyConfig {
    ConfigBuilder::new()
        .environment(Some(environment.to_string()))
        .project(Some(project.to_string()))
        .jwt_secret_arn(Some(
            "arn:aws:secretsmanager:eu-west-1:123456789012:secret:jwt-AbCdEf".to_string(),
        ))
        .db_secret_arn(Some(
            "arn:aws:secretsmanager:eu-west-1:123456789012:secret:db-AbCdEf".to_string(),
        ))
        .domain_name(Some("example.org".to_string()))
        .subdomain_name(Some(subdomain.to_string()))
        .build()
        .unwrap()
}

/// Ingress declarations of the database boundary, as emitted
fn database_ingress(resources: &[Resource], group: &str) -> Vec<Resource> {
    resources
        .iter()
        .filter(|r| r.id.resource_type == "ec2_security_group_ingress")
        .filter(|r| r.attributes["group_id"] == Value::ResourceRef(group.into(), "id".into()))
        .cloned()
        .collect()
}

fn environment() -> impl Strategy<Value = String> {
    prop_oneof![Just("dev".to_string()), Just("prod".to_string())]
}

fn label() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

proptest! {
    /// Every declaration only references bindings declared before it
    #[test]
    fn prop_no_forward_references(env in environment(), project in label()) {
        let topology = Topology::build(&config(&env, &project, "api")).unwrap();

        let mut seen: HashSet<String> = HashSet::new();
        for unit in Unit::all() {
            for resource in topology.resources(unit) {
                for dependency in resource.dependencies() {
                    prop_assert!(
                        seen.contains(&dependency),
                        "{} references {} before it is declared",
                        resource.id,
                        dependency
                    );
                }
                seen.insert(resource.binding().to_string());
            }
        }
    }

    /// The database survives destroy whatever the environment
    #[test]
    fn prop_database_retained(env in environment(), project in label()) {
        let topology = Topology::build(&config(&env, &project, "api")).unwrap();
        let retained: Vec<_> = topology
            .resources(Unit::Network)
            .iter()
            .filter(|r| r.id.resource_type == "rds_db_instance")
            .map(|r| r.removal_policy)
            .collect();
        prop_assert_eq!(retained, vec![RemovalPolicy::Retain]);
    }

    /// Every taggable resource carries the environment and project tags
    #[test]
    fn prop_tags_and_units(env in environment(), project in label()) {
        let topology = Topology::build(&config(&env, &project, "api")).unwrap();
        for unit in Unit::all() {
            for resource in topology.resources(unit) {
                prop_assert_eq!(resource.unit(), Some(unit.as_str()));
                if let Some(Value::Map(tags)) = resource.attributes.get("tags") {
                    prop_assert_eq!(&tags["environment"], &Value::string(env.as_str()));
                    prop_assert_eq!(&tags["projectId"], &Value::string(project.as_str()));
                }
            }
        }
    }

    /// Names are unique across both units
    #[test]
    fn prop_bindings_unique(env in environment(), project in label()) {
        let topology = Topology::build(&config(&env, &project, "api")).unwrap();
        let mut seen = HashSet::new();
        for unit in Unit::all() {
            for resource in topology.resources(unit) {
                prop_assert!(seen.insert(resource.binding().to_string()), "{} declared twice", resource.id);
            }
        }
    }

    /// Generated secret material never holds punctuation or whitespace
    #[test]
    fn prop_secret_policy(length in 1usize..128) {
        let policy = SecretPolicy { length, ..SecretPolicy::default() };
        let secret = policy.generate();
        prop_assert_eq!(secret.chars().count(), length);
        prop_assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    /// Plain HTTP always redirects to HTTPS on the same host, path and query
    #[test]
    fn prop_http_redirects(subdomain in label(), path in "(/[a-z0-9]{1,8}){0,3}", query in "([a-z]=[0-9])?") {
        let topology = Topology::build(&config("dev", "hasura", &subdomain)).unwrap();
        let chain = topology.service.ingress();

        let mut request = format!("http://{}.example.org{}", subdomain, path);
        let mut expected = format!("https://{}.example.org{}", subdomain, if path.is_empty() { "/" } else { path.as_str() });
        if !query.is_empty() {
            request.push('?');
            request.push_str(&query);
            expected.push('?');
            expected.push_str(&query);
        }
        prop_assert_eq!(chain.route(&request).unwrap(), Route::Redirect(expected));
    }

    /// Adding the same rule any number of times yields one rule
    #[test]
    fn prop_rules_deduplicate(ports in prop::collection::vec(1u16..1024, 1..20)) {
        let config = config("dev", "hasura", "api");
        let mut stack = Stack::new(Unit::Network, &config);
        let vpc = hasura_infra_stacks::network::declare_network(&mut stack).vpc;
        let mut boundary = TrustBoundary::declare(&mut stack, &vpc, "test", "test", true);

        for port in &ports {
            boundary.allow(RuleSource::SelfRef, *port, Protocol::Tcp);
            boundary.allow(RuleSource::SelfRef, *port, Protocol::Tcp);
        }
        let unique: HashSet<u16> = ports.iter().copied().collect();
        prop_assert_eq!(boundary.resolved_rules().len(), unique.len());
    }

    /// The database-connection rules come out the same whatever order they are added in
    #[test]
    fn prop_database_rules_ignore_order(
        order in Just((0..5).collect::<Vec<usize>>()).prop_shuffle(),
        repeats in prop::collection::vec(0usize..5, 0..5),
    ) {
        let config = config("dev", "hasura", "api");

        let mut reference = Stack::new(Unit::Network, &config);
        let vpc = declare_network(&mut reference).vpc;
        let boundaries = declare_boundaries(&mut reference, &vpc).unwrap();
        let group = boundaries.database.handle().binding.clone();
        let expected = database_ingress(reference.resources(), &group);
        prop_assert_eq!(expected.len(), 5);

        let mut stack = Stack::new(Unit::Network, &config);
        let vpc = declare_network(&mut stack).vpc;
        let bastion = TrustBoundary::declare(&mut stack, &vpc, "bastion-to-db-connection", "Bastion host access to the database", true);
        let proxy = TrustBoundary::declare(&mut stack, &vpc, "lambda-to-rds-proxy-connection", "Function access to the database proxy", true);
        let mut database = TrustBoundary::declare(&mut stack, &vpc, "proxy-to-DB-connection", "Database and proxy connections", true);
        let service = TrustBoundary::declare(&mut stack, &vpc, "fargate-to-db-connection", "Container hosts access to the database", true);

        let sources = [
            RuleSource::SelfRef,
            RuleSource::Cidr(VPC_CIDR.to_string()),
            RuleSource::Boundary(proxy.handle().clone()),
            RuleSource::Boundary(bastion.handle().clone()),
            RuleSource::Boundary(service.handle().clone()),
        ];
        for i in order.iter().chain(repeats.iter()) {
            database.allow_tcp(sources[*i].clone(), POSTGRES_PORT);
        }
        database.emit_rules(&mut stack).unwrap();

        prop_assert_eq!(database.resolved_rules(), boundaries.database.resolved_rules());
        prop_assert_eq!(database_ingress(stack.resources(), &group), expected);
    }
}
