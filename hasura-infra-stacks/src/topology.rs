//! Topology - The two deployment units and their hand-off
//!
//! The network unit owns the VPC, trust boundaries, secrets, bastion and
//! database. The service unit receives a narrow set of handles from it
//! ([`NetworkOutputs`]) and only ever references them.

use std::collections::HashSet;

use hasura_infra_core::graph::ResolvedGraph;
use hasura_infra_core::resource::{RemovalPolicy, Resource};

use crate::bastion::{Bastion, declare_bastion};
use crate::config::TopologyConfig;
use crate::credentials::{Credentials, declare_credentials};
use crate::database::{Database, declare_database};
use crate::error::BuildError;
use crate::ingress::{
    HTTPS_PORT, IngressBoundaries, IngressChain, LoadBalancer, declare_alias_record,
    declare_boundaries as declare_ingress_boundaries, declare_load_balancer,
};
use crate::network::{
    Boundaries, Network, RuleSource, TrustBoundary, VPC_CIDR, declare_boundaries, declare_network,
};
use crate::service::{
    Capacity, ServiceSecrets, Task, declare_capacity, declare_cluster, declare_secrets,
    declare_service, declare_task,
};
use crate::stack::{Handle, Stack, Unit};

/// Handles the service unit may reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkOutputs {
    pub vpc: Handle,
    pub service_to_database: Handle,
    pub private_subnets: Vec<Handle>,
    pub public_subnets: Vec<Handle>,
}

impl NetworkOutputs {
    /// Binding names exported to the service unit
    pub fn bindings(&self) -> HashSet<String> {
        std::iter::once(&self.vpc)
            .chain(std::iter::once(&self.service_to_database))
            .chain(self.private_subnets.iter())
            .chain(self.public_subnets.iter())
            .map(|h| h.binding.clone())
            .collect()
    }
}

/// Network & data foundation unit
#[derive(Debug, Clone)]
pub struct NetworkStack {
    pub network: Network,
    pub boundaries: Boundaries,
    pub endpoint_boundary: TrustBoundary,
    pub credentials: Credentials,
    pub bastion: Bastion,
    pub database: Database,
    graph: ResolvedGraph,
}

impl NetworkStack {
    pub fn build(config: &TopologyConfig) -> Result<Self, BuildError> {
        let mut stack = Stack::new(Unit::Network, config);

        let network = declare_network(&mut stack);
        let boundaries = declare_boundaries(&mut stack, &network.vpc)?;

        let mut endpoint_boundary = TrustBoundary::declare(
            &mut stack,
            &network.vpc,
            "secrets-manager-endpoint-sg",
            "Private access to Secrets Manager",
            true,
        );
        endpoint_boundary.allow_tcp(RuleSource::Cidr(VPC_CIDR.to_string()), HTTPS_PORT);
        endpoint_boundary.emit_rules(&mut stack)?;

        let credentials = declare_credentials(
            &mut stack,
            &network.vpc,
            &network.private_subnets,
            &endpoint_boundary,
        );
        let bastion = declare_bastion(
            &mut stack,
            &network.public_subnets[0],
            &boundaries.bastion,
            &credentials.primary,
        );
        let database = declare_database(
            &mut stack,
            &network.private_subnets,
            &boundaries.database,
            &credentials.primary,
        );

        let graph = stack.resolve()?;
        validate(&graph.resources)?;
        log::info!(
            "Built unit {} with {} declarations",
            Unit::Network,
            graph.resources.len()
        );

        Ok(Self {
            network,
            boundaries,
            endpoint_boundary,
            credentials,
            bastion,
            database,
            graph,
        })
    }

    pub fn outputs(&self) -> NetworkOutputs {
        NetworkOutputs {
            vpc: self.network.vpc.clone(),
            service_to_database: self.boundaries.service_to_database.handle().clone(),
            private_subnets: self.network.private_subnets.clone(),
            public_subnets: self.network.public_subnets.clone(),
        }
    }

    /// Declarations in dependency order
    pub fn resources(&self) -> &[Resource] {
        &self.graph.resources
    }

    pub fn graph(&self) -> &ResolvedGraph {
        &self.graph
    }
}

/// Service & ingress unit
#[derive(Debug, Clone)]
pub struct ServiceStack {
    pub secrets: ServiceSecrets,
    pub task: Task,
    pub cluster: Handle,
    pub boundaries: IngressBoundaries,
    pub capacity: Capacity,
    pub load_balancer: LoadBalancer,
    pub service: Handle,
    pub alias_record: Handle,
    graph: ResolvedGraph,
}

impl ServiceStack {
    pub fn build(config: &TopologyConfig, network: &NetworkOutputs) -> Result<Self, BuildError> {
        let mut stack = Stack::new(Unit::Service, config).with_external(network.bindings());

        let secrets = declare_secrets(&mut stack)?;
        let task = declare_task(&mut stack, &secrets)?;
        let cluster = declare_cluster(&mut stack);

        let boundaries = declare_ingress_boundaries(&mut stack, &network.vpc)?;
        let capacity = declare_capacity(
            &mut stack,
            &cluster,
            &network.private_subnets,
            &[
                boundaries.service_instance.handle(),
                &network.service_to_database,
            ],
        );

        let load_balancer = declare_load_balancer(
            &mut stack,
            &network.vpc,
            &network.public_subnets,
            &boundaries.load_balancer,
        );
        let service = declare_service(
            &mut stack,
            &cluster,
            &task,
            &load_balancer.target_group,
            &load_balancer.https_listener,
        );
        let alias_record = declare_alias_record(&mut stack, &load_balancer);

        let graph = stack.resolve()?;
        validate(&graph.resources)?;
        log::info!(
            "Built unit {} with {} declarations",
            Unit::Service,
            graph.resources.len()
        );

        Ok(Self {
            secrets,
            task,
            cluster,
            boundaries,
            capacity,
            load_balancer,
            service,
            alias_record,
            graph,
        })
    }

    pub fn resources(&self) -> &[Resource] {
        &self.graph.resources
    }

    pub fn graph(&self) -> &ResolvedGraph {
        &self.graph
    }

    /// Routing model of the declared listeners
    pub fn ingress(&self) -> IngressChain {
        IngressChain::from_resources(&self.graph.resources)
    }
}

/// Both units of one deployment
#[derive(Debug, Clone)]
pub struct Topology {
    pub config: TopologyConfig,
    pub network: NetworkStack,
    pub service: ServiceStack,
}

impl Topology {
    pub fn build(config: &TopologyConfig) -> Result<Self, BuildError> {
        let network = NetworkStack::build(config)?;
        let service = ServiceStack::build(config, &network.outputs())?;
        Ok(Self {
            config: config.clone(),
            network,
            service,
        })
    }

    /// Declarations of one unit, in dependency order
    pub fn resources(&self, unit: Unit) -> &[Resource] {
        match unit {
            Unit::Network => self.network.resources(),
            Unit::Service => self.service.resources(),
        }
    }

    /// Stack name of a unit, e.g. `hasura-dev-network`
    pub fn stack_name(&self, unit: Unit) -> String {
        hasura_infra_core::naming::stack_name(
            unit.as_str(),
            self.config.environment.as_str(),
            &self.config.project,
        )
    }
}

/// Reject declaration sets that could lose data on destroy
pub fn validate(resources: &[Resource]) -> Result<(), BuildError> {
    for resource in resources {
        if resource.id.resource_type == "rds_db_instance"
            && resource.removal_policy != RemovalPolicy::Retain
        {
            return Err(BuildError::DataSafety(format!(
                "{} must be retained on destroy",
                resource.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use hasura_infra_core::resource::Value;

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
    fn outputs_export_only_the_handed_off_handles() {
        let network = NetworkStack::build(&config()).unwrap();
        let bindings = network.outputs().bindings();
        assert_eq!(bindings.len(), 6);
        assert!(bindings.contains("hasura-dev-vpc"));
        assert!(bindings.contains("hasura-dev-fargate-to-db-connection"));
        assert!(!bindings.contains("hasura-dev-rds-credentials"));
    }

    #[test]
    fn service_unit_declares_nothing_owned_by_network_unit() {
        let topology = Topology::build(&config()).unwrap();
        let network: HashSet<&str> = topology
            .resources(Unit::Network)
            .iter()
            .map(Resource::binding)
            .collect();
        for resource in topology.resources(Unit::Service) {
            assert!(!network.contains(resource.binding()));
            assert_eq!(resource.unit(), Some("service"));
        }
    }

    #[test]
    fn container_hosts_carry_database_boundary_from_network_unit() {
        let topology = Topology::build(&config()).unwrap();
        let template = topology
            .resources(Unit::Service)
            .iter()
            .find(|r| r.id.resource_type == "ec2_launch_template")
            .unwrap();
        let Some(Value::Map(data)) = template.attributes.get("launch_template_data") else {
            panic!("launch template data missing");
        };
        let Some(Value::List(groups)) = data.get("security_group_ids") else {
            panic!("security groups missing");
        };
        assert_eq!(
            groups,
            &vec![
                Value::ResourceRef("hasura-dev-service-instance-security-group".into(), "id".into()),
                Value::ResourceRef("hasura-dev-fargate-to-db-connection".into(), "id".into()),
            ]
        );
    }

    #[test]
    fn unretained_database_is_rejected() {
        let resources = vec![Resource::new("rds_db_instance", "hasura-dev")];
        assert!(matches!(
            validate(&resources),
            Err(BuildError::DataSafety(_))
        ));
    }

    #[test]
    fn stack_names_follow_units() {
        let topology = Topology::build(&config()).unwrap();
        assert_eq!(topology.stack_name(Unit::Network), "hasura-dev-network");
        assert_eq!(topology.stack_name(Unit::Service), "hasura-dev-service");
    }
}
