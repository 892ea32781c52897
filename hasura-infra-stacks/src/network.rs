//! Network and trust boundaries
//!
//! Declares the VPC with public and NAT-routed private subnets in two
//! availability zones, and the security groups ("trust boundaries") that
//! control which components may reach each other.

use std::collections::BTreeSet;
use std::fmt;

use hasura_infra_core::resource::{Resource, Value};

use crate::error::BuildError;
use crate::stack::{Handle, Stack};

pub const VPC_CIDR: &str = "192.168.0.0/16";
pub const PUBLIC_SUBNET_CIDRS: [&str; 2] = ["192.168.0.0/24", "192.168.1.0/24"];
pub const PRIVATE_SUBNET_CIDRS: [&str; 2] = ["192.168.2.0/24", "192.168.3.0/24"];
pub const ANYWHERE: &str = "0.0.0.0/0";
pub const POSTGRES_PORT: u16 = 5432;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// Where permitted traffic may originate
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleSource {
    /// Members of another boundary
    Boundary(Handle),
    Cidr(String),
    /// Members of the boundary itself
    SelfRef,
}

impl RuleSource {
    fn label(&self, owner: &str) -> String {
        match self {
            RuleSource::Boundary(handle) => handle
                .binding
                .strip_prefix(common_prefix(owner, &handle.binding))
                .unwrap_or(&handle.binding)
                .to_string(),
            RuleSource::Cidr(cidr) => cidr.replace(['.', '/'], "-"),
            RuleSource::SelfRef => "self".to_string(),
        }
    }
}

/// `hasura-dev-` shared by two names of the same deployment
fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let mut end = 0;
    for ((i, ca), cb) in a.char_indices().zip(b.chars()) {
        if ca != cb {
            break;
        }
        if ca == '-' {
            end = i + 1;
        }
    }
    &a[..end]
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Boundary(handle) => write!(f, "{}", handle.binding),
            RuleSource::Cidr(cidr) => f.write_str(cidr),
            RuleSource::SelfRef => f.write_str("self"),
        }
    }
}

/// A permitted inbound flow; identity is (source, port, protocol)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IngressRule {
    pub source: RuleSource,
    pub port: u16,
    pub protocol: Protocol,
}

/// Security group with a deduplicated set of ingress rules
#[derive(Debug, Clone)]
pub struct TrustBoundary {
    name: String,
    handle: Handle,
    rules: BTreeSet<IngressRule>,
}

impl TrustBoundary {
    /// Declare the boundary's security group in `vpc`
    pub fn declare(
        stack: &mut Stack<'_>,
        vpc: &Handle,
        role: &str,
        description: &str,
        allow_all_outbound: bool,
    ) -> Self {
        let name = stack.config().name(role);
        let mut group = Resource::new("ec2_security_group", name.as_str())
            .with_attribute("group_name", Value::string(name.as_str()))
            .with_attribute("group_description", Value::string(description))
            .with_attribute("vpc_id", vpc.id());

        if !allow_all_outbound {
            // Without an explicit egress rule the engine opens all outbound traffic
            group = group.with_attribute(
                "security_group_egress",
                Value::List(vec![Value::map([
                    ("cidr_ip", Value::string("255.255.255.255/32")),
                    ("ip_protocol", Value::string("icmp")),
                    ("from_port", Value::Int(252)),
                    ("to_port", Value::Int(86)),
                    ("description", Value::string("Disallow all traffic")),
                ])]),
            );
        }

        let handle = stack.declare(group);
        Self {
            name,
            handle,
            rules: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Permit inbound traffic; returns false if the rule was already present
    pub fn allow(&mut self, source: RuleSource, port: u16, protocol: Protocol) -> bool {
        self.rules.insert(IngressRule {
            source,
            port,
            protocol,
        })
    }

    pub fn allow_tcp(&mut self, source: RuleSource, port: u16) -> bool {
        self.allow(source, port, Protocol::Tcp)
    }

    /// Sorted union of all rules
    pub fn resolved_rules(&self) -> Vec<IngressRule> {
        self.rules.iter().cloned().collect()
    }

    /// Declare one ingress resource per rule
    ///
    /// Every boundary used as a source must already be declared.
    pub fn emit_rules(&self, stack: &mut Stack<'_>) -> Result<Vec<Handle>, BuildError> {
        for rule in &self.rules {
            if let RuleSource::Boundary(source) = &rule.source
                && !stack.knows(source)
            {
                return Err(BuildError::UndeclaredBoundary {
                    boundary: self.name.clone(),
                    referenced: source.binding.clone(),
                });
            }
        }

        let mut handles = Vec::new();
        for rule in &self.rules {
            let name = format!(
                "{}-ingress-{}-{}-{}",
                self.name,
                rule.source.label(&self.name),
                rule.protocol.as_str(),
                rule.port
            );
            let mut resource = Resource::new("ec2_security_group_ingress", name)
                .with_attribute("group_id", self.handle.id())
                .with_attribute("ip_protocol", Value::string(rule.protocol.as_str()))
                .with_attribute("from_port", Value::Int(i64::from(rule.port)))
                .with_attribute("to_port", Value::Int(i64::from(rule.port)))
                .with_attribute(
                    "description",
                    Value::string(format!("from {}:{}", rule.source, rule.port)),
                );
            resource = match &rule.source {
                RuleSource::Boundary(source) => {
                    resource.with_attribute("source_security_group_id", source.id())
                }
                RuleSource::SelfRef => {
                    resource.with_attribute("source_security_group_id", self.handle.id())
                }
                RuleSource::Cidr(cidr) => resource.with_attribute("cidr_ip", Value::string(cidr)),
            };
            handles.push(stack.declare(resource));
        }
        Ok(handles)
    }
}

/// Handles produced by [`declare_network`]
#[derive(Debug, Clone)]
pub struct Network {
    pub vpc: Handle,
    pub public_subnets: Vec<Handle>,
    pub private_subnets: Vec<Handle>,
}

/// Declare the VPC, subnets, gateways and route tables
pub fn declare_network(stack: &mut Stack<'_>) -> Network {
    let config = stack.config();
    let zones = config.availability_zones();

    let vpc = stack.declare(
        Resource::new("ec2_vpc", config.name("vpc"))
            .with_attribute("cidr_block", Value::string(VPC_CIDR))
            .with_attribute("enable_dns_support", Value::Bool(true))
            .with_attribute("enable_dns_hostnames", Value::Bool(true))
            .with_attribute("tags", Value::map([("Name", Value::string(config.name("vpc")))])),
    );

    let igw = stack.declare(Resource::new("ec2_internet_gateway", config.name("igw")));
    let attachment = stack.declare(
        Resource::new("ec2_vpc_gateway_attachment", config.name("igw-attachment"))
            .with_attribute("vpc_id", vpc.id())
            .with_attribute("internet_gateway_id", igw.id()),
    );

    let mut public_subnets = Vec::new();
    let mut private_subnets = Vec::new();
    for (kind, cidrs, public) in [
        ("public", PUBLIC_SUBNET_CIDRS, true),
        ("private", PRIVATE_SUBNET_CIDRS, false),
    ] {
        for (i, (cidr, zone)) in cidrs.iter().zip(zones.iter()).enumerate() {
            let name = config.name(&format!("{}-subnet-{}", kind, i + 1));
            let subnet = stack.declare(
                Resource::new("ec2_subnet", name.as_str())
                    .with_attribute("vpc_id", vpc.id())
                    .with_attribute("cidr_block", Value::string(*cidr))
                    .with_attribute("availability_zone", Value::string(zone))
                    .with_attribute("map_public_ip_on_launch", Value::Bool(public))
                    .with_attribute("tags", Value::map([("Name", Value::string(name.as_str()))])),
            );
            if public {
                public_subnets.push(subnet);
            } else {
                private_subnets.push(subnet);
            }
        }
    }

    let public_rt = stack.declare(
        Resource::new("ec2_route_table", config.name("public-rt")).with_attribute("vpc_id", vpc.id()),
    );
    stack.declare(
        Resource::new("ec2_route", config.name("public-default-route"))
            .with_attribute("route_table_id", public_rt.id())
            .with_attribute("destination_cidr_block", Value::string(ANYWHERE))
            .with_attribute("gateway_id", igw.id())
            .with_attribute("_depends_on", Value::List(vec![attachment.id()])),
    );
    for (i, subnet) in public_subnets.iter().enumerate() {
        stack.declare(
            Resource::new(
                "ec2_subnet_route_table_association",
                config.name(&format!("public-rt-association-{}", i + 1)),
            )
            .with_attribute("route_table_id", public_rt.id())
            .with_attribute("subnet_id", subnet.id()),
        );
    }

    // One NAT gateway and private route table per availability zone
    for (i, (public, private)) in public_subnets.iter().zip(private_subnets.iter()).enumerate() {
        let n = i + 1;
        let eip = stack.declare(
            Resource::new("ec2_eip", config.name(&format!("nat-eip-{}", n)))
                .with_attribute("domain", Value::string("vpc"))
                .with_attribute("_depends_on", Value::List(vec![attachment.id()])),
        );
        let nat = stack.declare(
            Resource::new("ec2_nat_gateway", config.name(&format!("nat-gateway-{}", n)))
                .with_attribute("subnet_id", public.id())
                .with_attribute("allocation_id", eip.attr("allocation_id")),
        );
        let rt = stack.declare(
            Resource::new("ec2_route_table", config.name(&format!("private-rt-{}", n)))
                .with_attribute("vpc_id", vpc.id()),
        );
        stack.declare(
            Resource::new("ec2_route", config.name(&format!("private-default-route-{}", n)))
                .with_attribute("route_table_id", rt.id())
                .with_attribute("destination_cidr_block", Value::string(ANYWHERE))
                .with_attribute("nat_gateway_id", nat.id()),
        );
        stack.declare(
            Resource::new(
                "ec2_subnet_route_table_association",
                config.name(&format!("private-rt-association-{}", n)),
            )
            .with_attribute("route_table_id", rt.id())
            .with_attribute("subnet_id", private.id()),
        );
    }

    Network {
        vpc,
        public_subnets,
        private_subnets,
    }
}

/// The four boundaries of the foundation unit
#[derive(Debug, Clone)]
pub struct Boundaries {
    pub bastion: TrustBoundary,
    pub proxy_access: TrustBoundary,
    pub database: TrustBoundary,
    pub service_to_database: TrustBoundary,
}

/// Declare the trust boundaries, then the database-connection rules
pub fn declare_boundaries(stack: &mut Stack<'_>, vpc: &Handle) -> Result<Boundaries, BuildError> {
    let bastion = TrustBoundary::declare(
        stack,
        vpc,
        "bastion-to-db-connection",
        "Bastion host access to the database",
        true,
    );
    let proxy_access = TrustBoundary::declare(
        stack,
        vpc,
        "lambda-to-rds-proxy-connection",
        "Function access to the database proxy",
        true,
    );
    let mut database = TrustBoundary::declare(
        stack,
        vpc,
        "proxy-to-DB-connection",
        "Database and proxy connections",
        true,
    );
    let service_to_database = TrustBoundary::declare(
        stack,
        vpc,
        "fargate-to-db-connection",
        "Container hosts access to the database",
        true,
    );

    database.allow_tcp(RuleSource::SelfRef, POSTGRES_PORT);
    database.allow_tcp(RuleSource::Cidr(VPC_CIDR.to_string()), POSTGRES_PORT);
    database.allow_tcp(RuleSource::Boundary(proxy_access.handle().clone()), POSTGRES_PORT);
    database.allow_tcp(RuleSource::Boundary(bastion.handle().clone()), POSTGRES_PORT);
    database.allow_tcp(
        RuleSource::Boundary(service_to_database.handle().clone()),
        POSTGRES_PORT,
    );
    database.emit_rules(stack)?;

    Ok(Boundaries {
        bastion,
        proxy_access,
        database,
        service_to_database,
    })
}
