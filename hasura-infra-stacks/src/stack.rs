//! Stack - Ordered collection of declarations for one deployment unit

use std::collections::HashSet;
use std::fmt;

use hasura_infra_core::graph::{self, ResolvedGraph};
use hasura_infra_core::resource::{Resource, Value};

use crate::config::TopologyConfig;
use crate::error::BuildError;

/// Deployment unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    /// Network & data foundation
    Network,
    /// Service & ingress
    Service,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Network => "network",
            Unit::Service => "service",
        }
    }

    pub fn all() -> [Unit; 2] {
        [Unit::Network, Unit::Service]
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource types that cannot carry tags
const UNTAGGED_TYPES: &[&str] = &[
    "ec2_vpc_gateway_attachment",
    "ec2_route",
    "ec2_subnet_route_table_association",
    "ec2_security_group_ingress",
    "iam_instance_profile",
    "iam_role_policy",
    "ec2_launch_template",
    "autoscaling_auto_scaling_group",
    "rds_db_proxy_target_group",
    "elbv2_listener",
    "route53_record_set",
];

/// Reference to a declared resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    pub resource_type: String,
    pub binding: String,
}

impl Handle {
    /// Reference to an attribute of the resource
    pub fn attr(&self, name: &str) -> Value {
        Value::ResourceRef(self.binding.clone(), name.to_string())
    }

    /// Reference to the engine-generated identifier
    pub fn id(&self) -> Value {
        self.attr("id")
    }

    pub fn arn(&self) -> Value {
        self.attr("arn")
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.binding)
    }
}

/// Collects the declarations of one unit in declaration order
pub struct Stack<'a> {
    unit: Unit,
    config: &'a TopologyConfig,
    resources: Vec<Resource>,
    declared: HashSet<String>,
    external: HashSet<String>,
}

impl<'a> Stack<'a> {
    pub fn new(unit: Unit, config: &'a TopologyConfig) -> Self {
        Self {
            unit,
            config,
            resources: Vec::new(),
            declared: HashSet::new(),
            external: HashSet::new(),
        }
    }

    /// Bindings of an earlier unit this stack may reference
    pub fn with_external(mut self, external: HashSet<String>) -> Self {
        self.external = external;
        self
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn config(&self) -> &'a TopologyConfig {
        self.config
    }

    /// Add a declaration, stamping its unit and deployment tags
    pub fn declare(&mut self, resource: Resource) -> Handle {
        let mut resource = resource.with_attribute("_unit", Value::string(self.unit.as_str()));
        if !resource.is_data_source() && !UNTAGGED_TYPES.contains(&resource.id.resource_type.as_str())
        {
            let mut tags = match resource.attributes.remove("tags") {
                Some(Value::Map(existing)) => existing,
                _ => Default::default(),
            };
            for (key, value) in self.config.tags() {
                tags.entry(key.to_string()).or_insert(Value::String(value));
            }
            resource.attributes.insert("tags".to_string(), Value::Map(tags));
        }

        let handle = Handle {
            resource_type: resource.id.resource_type.clone(),
            binding: resource.binding().to_string(),
        };
        log::trace!("Declared {} in unit {}", handle, self.unit);
        self.declared.insert(handle.binding.clone());
        self.resources.push(resource);
        handle
    }

    /// True when the handle was declared by this stack or an earlier unit
    pub fn knows(&self, handle: &Handle) -> bool {
        self.declared.contains(&handle.binding) || self.external.contains(&handle.binding)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Check references and order the declarations
    pub fn resolve(self) -> Result<ResolvedGraph, BuildError> {
        Ok(graph::resolve(self.resources, &self.external)?)
    }
}

/// IAM policy document granting `actions` on `resources`
pub fn policy_document(actions: &[&str], resources: Vec<Value>) -> Value {
    Value::map([
        ("Version", Value::string("2012-10-17")),
        (
            "Statement",
            Value::List(vec![Value::map([
                ("Effect", Value::string("Allow")),
                ("Action", Value::strings(actions.iter().copied())),
                ("Resource", Value::List(resources)),
            ])]),
        ),
    ])
}

/// Trust policy letting an AWS service assume a role
pub fn assume_role_policy(service: &str) -> Value {
    Value::map([
        ("Version", Value::string("2012-10-17")),
        (
            "Statement",
            Value::List(vec![Value::map([
                ("Effect", Value::string("Allow")),
                ("Principal", Value::map([("Service", Value::string(service))])),
                ("Action", Value::strings(["sts:AssumeRole"])),
            ])]),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    fn config() -> TopologyConfig {
        ConfigBuilder::new()
            .jwt_secret_arn(Some(
                "arn:aws:secretsmanager:us-east-1:123456789012:secret:jwt-AbCdEf".to_string(),
            ))
            .db_secret_arn(Some(
                "arn:aws:secretsmanager:us-east-1:123456789012:secret:db-AbCdEf".to_string(),
            ))
            .domain_name(Some("example.com".to_string()))
            .subdomain_name(Some("api".to_string()))
            .build()
            .unwrap()
    }

    #[test]
    fn declare_stamps_unit_and_tags() {
        let config = config();
        let mut stack = Stack::new(Unit::Network, &config);
        let vpc = stack.declare(Resource::new("ec2_vpc", "hasura-dev-vpc"));

        assert_eq!(vpc.id(), Value::ResourceRef("hasura-dev-vpc".into(), "id".into()));
        let resource = &stack.resources()[0];
        assert_eq!(resource.unit(), Some("network"));
        let Some(Value::Map(tags)) = resource.attributes.get("tags") else {
            panic!("tags missing");
        };
        assert_eq!(tags["environment"], Value::string("dev"));
        assert_eq!(tags["projectId"], Value::string("hasura"));
    }

    #[test]
    fn untagged_types_and_data_sources_get_no_tags() {
        let config = config();
        let mut stack = Stack::new(Unit::Service, &config);
        stack.declare(Resource::new("route53_hosted_zone", "zone").with_read_only(true));
        stack.declare(Resource::new("elbv2_listener", "listener"));

        assert!(stack.resources().iter().all(|r| !r.attributes.contains_key("tags")));
    }

    #[test]
    fn external_handles_are_known() {
        let config = config();
        let stack = Stack::new(Unit::Service, &config)
            .with_external(HashSet::from(["hasura-dev-vpc".to_string()]));
        let vpc = Handle {
            resource_type: "ec2_vpc".to_string(),
            binding: "hasura-dev-vpc".to_string(),
        };
        assert!(stack.knows(&vpc));
    }
}
