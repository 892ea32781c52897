//! GraphQL engine task, cluster, capacity and service

use hasura_infra_core::resource::{Resource, Value};

use crate::credentials::{SecretPolicy, declare_secret, reference_secret};
use crate::error::BuildError;
use crate::stack::{Handle, Stack, assume_role_policy, policy_document};

pub const IMAGE: &str = "hasura/graphql-engine:latest.amd64";
pub const CONTAINER_NAME: &str = "hasura";
pub const CONTAINER_PORT: u16 = 8080;
pub const MEMORY_RESERVATION_MIB: i64 = 512;
pub const ECS_OPTIMIZED_AMI: &str =
    "{{resolve:ssm:/aws/service/ecs/optimized-ami/amazon-linux-2/recommended/image_id}}";
const TASK_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";
const CONTAINER_INSTANCE_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonEC2ContainerServiceforEC2Role";

/// Plain environment of the container
pub const ENVIRONMENT: [(&str, &str); 3] = [
    ("HASURA_GRAPHQL_ENABLE_CONSOLE", "true"),
    ("HASURA_GRAPHQL_DEV_MODE", "true"),
    (
        "HASURA_GRAPHQL_ENABLED_LOG_TYPES",
        "startup, http-log, webhook-log, websocket-log, query-log",
    ),
];

/// Secrets consumed by the task
#[derive(Debug, Clone)]
pub struct ServiceSecrets {
    pub admin: Handle,
    pub jwt: Handle,
    pub database_url: Handle,
}

impl ServiceSecrets {
    /// Environment variable -> secret
    pub fn bindings(&self) -> Vec<(&'static str, &Handle)> {
        vec![
            ("HASURA_GRAPHQL_ADMIN_SECRET", &self.admin),
            ("PG_DATABASE_URL", &self.database_url),
            ("HASURA_GRAPHQL_JWT_SECRET", &self.jwt),
            ("HASURA_GRAPHQL_METADATA_DATABASE_URL", &self.database_url),
        ]
    }

    fn all(&self) -> [&Handle; 3] {
        [&self.admin, &self.jwt, &self.database_url]
    }
}

/// Declare the generated admin secret and reference the external ones
pub fn declare_secrets(stack: &mut Stack<'_>) -> Result<ServiceSecrets, BuildError> {
    let config = stack.config();
    let admin = declare_secret(
        stack,
        "admin-secret",
        "GraphQL engine admin secret",
        &SecretPolicy::default(),
    );
    let jwt = reference_secret(stack, "jwt-secret", &config.jwt_secret_arn)?;
    let database_url = reference_secret(stack, "database-url-secret", &config.db_secret_arn)?;
    Ok(ServiceSecrets {
        admin,
        jwt,
        database_url,
    })
}

#[derive(Debug, Clone)]
pub struct Task {
    pub log_group: Handle,
    pub execution_role: Handle,
    pub definition: Handle,
}

/// Declare the task specification
///
/// Every secret bound into the container must already be declared.
pub fn declare_task(stack: &mut Stack<'_>, secrets: &ServiceSecrets) -> Result<Task, BuildError> {
    for (variable, secret) in secrets.bindings() {
        if !stack.knows(secret) {
            return Err(BuildError::Validation(format!(
                "{} is bound to {} which is not declared",
                variable, secret
            )));
        }
    }

    let config = stack.config();

    let log_group_name = config.name("hasura-logs");
    let log_group = stack.declare(
        Resource::new("logs_log_group", log_group_name.as_str())
            .with_attribute("log_group_name", Value::string(log_group_name.as_str())),
    );

    let execution_role = stack.declare(
        Resource::new("iam_role", config.name("task-execution-role"))
            .with_attribute("role_name", Value::string(config.name("task-execution-role")))
            .with_attribute(
                "assume_role_policy_document",
                assume_role_policy("ecs-tasks.amazonaws.com"),
            )
            .with_attribute("managed_policy_arns", Value::strings([TASK_EXECUTION_POLICY])),
    );
    stack.declare(
        Resource::new("iam_role_policy", config.name("task-secret-read"))
            .with_attribute("role_name", execution_role.id())
            .with_attribute("policy_name", Value::string(config.name("task-secret-read")))
            .with_attribute(
                "policy_document",
                policy_document(
                    &["secretsmanager:GetSecretValue"],
                    secrets.all().iter().map(|s| s.id()).collect(),
                ),
            ),
    );

    let environment = ENVIRONMENT
        .iter()
        .map(|(name, value)| Value::map([("name", Value::string(*name)), ("value", Value::string(*value))]))
        .collect();
    let container_secrets = secrets
        .bindings()
        .into_iter()
        .map(|(name, secret)| Value::map([("name", Value::string(name)), ("value_from", secret.id())]))
        .collect();

    let container = Value::map([
        ("name", Value::string(CONTAINER_NAME)),
        ("image", Value::string(IMAGE)),
        ("essential", Value::Bool(true)),
        ("entry_point", Value::strings(["graphql-engine"])),
        ("command", Value::strings(["serve", "--enable-console"])),
        ("memory_reservation", Value::Int(MEMORY_RESERVATION_MIB)),
        (
            "port_mappings",
            Value::List(vec![Value::map([
                ("container_port", Value::Int(i64::from(CONTAINER_PORT))),
                ("host_port", Value::Int(i64::from(CONTAINER_PORT))),
                ("protocol", Value::string("tcp")),
            ])]),
        ),
        ("environment", Value::List(environment)),
        ("secrets", Value::List(container_secrets)),
        (
            "log_configuration",
            Value::map([
                ("log_driver", Value::string("awslogs")),
                (
                    "options",
                    Value::map([
                        ("awslogs-group", log_group.id()),
                        ("awslogs-region", Value::string(config.region.as_str())),
                        ("awslogs-stream-prefix", Value::string("ecs")),
                    ]),
                ),
            ]),
        ),
    ]);

    let family = config.name("task-definition");
    let definition = stack.declare(
        Resource::new("ecs_task_definition", family.as_str())
            .with_attribute("family", Value::string(family.as_str()))
            .with_attribute("requires_compatibilities", Value::strings(["EC2"]))
            .with_attribute("network_mode", Value::string("bridge"))
            .with_attribute("execution_role_arn", execution_role.arn())
            .with_attribute("container_definitions", Value::List(vec![container]))
            .with_immutable(true),
    );

    Ok(Task {
        log_group,
        execution_role,
        definition,
    })
}

/// Cluster name registered by container instances at boot
pub fn cluster_name(stack: &Stack<'_>) -> String {
    stack.config().name("ecs-cluster")
}

pub fn declare_cluster(stack: &mut Stack<'_>) -> Handle {
    let name = cluster_name(stack);
    stack.declare(
        Resource::new("ecs_cluster", name.as_str())
            .with_attribute("cluster_name", Value::string(name.as_str())),
    )
}

#[derive(Debug, Clone)]
pub struct Capacity {
    pub launch_template: Handle,
    pub group: Handle,
}

/// Declare the container host group
///
/// Hosts carry both the service-instance boundary and the boundary that
/// grants database access.
pub fn declare_capacity(
    stack: &mut Stack<'_>,
    cluster: &Handle,
    private_subnets: &[Handle],
    boundaries: &[&Handle],
) -> Capacity {
    let config = stack.config();
    let capacity = &config.capacity;

    let role = stack.declare(
        Resource::new("iam_role", config.name("ecs-instance-role"))
            .with_attribute("role_name", Value::string(config.name("ecs-instance-role")))
            .with_attribute(
                "assume_role_policy_document",
                assume_role_policy("ec2.amazonaws.com"),
            )
            .with_attribute("managed_policy_arns", Value::strings([CONTAINER_INSTANCE_POLICY])),
    );
    let profile = stack.declare(
        Resource::new("iam_instance_profile", config.name("ecs-instance-profile"))
            .with_attribute("roles", Value::List(vec![role.id()])),
    );

    let user_data = format!(
        "#!/bin/bash\necho ECS_CLUSTER={} >> /etc/ecs/ecs.config",
        cluster_name(stack)
    );
    let template_name = config.name("cluster-capacity");
    let launch_template = stack.declare(
        Resource::new("ec2_launch_template", template_name.as_str())
            .with_attribute("launch_template_name", Value::string(template_name.as_str()))
            .with_attribute(
                "launch_template_data",
                Value::map([
                    ("image_id", Value::string(ECS_OPTIMIZED_AMI)),
                    ("instance_type", Value::string(capacity.instance_type.as_str())),
                    ("iam_instance_profile", Value::map([("name", profile.id())])),
                    (
                        "security_group_ids",
                        Value::List(boundaries.iter().map(|b| b.id()).collect()),
                    ),
                    ("user_data", Value::string(user_data)),
                ]),
            )
            .with_attribute("_depends_on", Value::List(vec![cluster.id()])),
    );

    let group = stack.declare(
        Resource::new("autoscaling_auto_scaling_group", format!("{}-group", template_name))
            .with_attribute(
                "auto_scaling_group_name",
                Value::string(format!("{}-group", template_name)),
            )
            .with_attribute("min_size", Value::Int(i64::from(capacity.min)))
            .with_attribute("desired_capacity", Value::Int(i64::from(capacity.desired)))
            .with_attribute("max_size", Value::Int(i64::from(capacity.max)))
            .with_attribute(
                "launch_template",
                Value::map([
                    ("launch_template_id", launch_template.id()),
                    ("version", launch_template.attr("latest_version_number")),
                ]),
            )
            .with_attribute(
                "vpc_zone_identifier",
                Value::List(private_subnets.iter().map(Handle::id).collect()),
            ),
    );

    Capacity {
        launch_template,
        group,
    }
}

/// Declare the long-running service attached to the target group
pub fn declare_service(
    stack: &mut Stack<'_>,
    cluster: &Handle,
    task: &Task,
    target_group: &Handle,
    listener: &Handle,
) -> Handle {
    let name = stack.config().name("fargate-service");
    stack.declare(
        Resource::new("ecs_service", name.as_str())
            .with_attribute("service_name", Value::string(name.as_str()))
            .with_attribute("cluster", cluster.id())
            .with_attribute("task_definition", task.definition.id())
            .with_attribute("desired_count", Value::Int(1))
            .with_attribute("launch_type", Value::string("EC2"))
            .with_attribute(
                "load_balancers",
                Value::List(vec![Value::map([
                    ("container_name", Value::string(CONTAINER_NAME)),
                    ("container_port", Value::Int(i64::from(CONTAINER_PORT))),
                    ("target_group_arn", target_group.id()),
                ])]),
            )
            .with_attribute("_depends_on", Value::List(vec![listener.id()])),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigBuilder, TopologyConfig};
    use crate::stack::Unit;

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
    fn task_refuses_undeclared_secrets() {
        let config = config();
        let mut other = Stack::new(Unit::Service, &config);
        let foreign = declare_secrets(&mut other).unwrap();

        let mut stack = Stack::new(Unit::Service, &config);
        let mut secrets = declare_secrets(&mut stack).unwrap();
        secrets.jwt = Handle {
            resource_type: "secretsmanager_secret".to_string(),
            binding: "hasura-dev-unknown-secret".to_string(),
        };

        let declared = stack.resources().len();
        match declare_task(&mut stack, &secrets) {
            Err(BuildError::Validation(message)) => {
                assert!(message.contains("HASURA_GRAPHQL_JWT_SECRET"), "{}", message);
                assert!(message.contains("hasura-dev-unknown-secret"), "{}", message);
            }
            other => panic!("Expected a validation error, got {:?}", other),
        }
        assert_eq!(stack.resources().len(), declared);

        let mut empty = Stack::new(Unit::Service, &config);
        assert!(matches!(
            declare_task(&mut empty, &foreign),
            Err(BuildError::Validation(_))
        ));
    }

    #[test]
    fn task_accepts_declared_secrets() {
        let config = config();
        let mut stack = Stack::new(Unit::Service, &config);
        let secrets = declare_secrets(&mut stack).unwrap();
        let task = declare_task(&mut stack, &secrets).unwrap();
        assert!(stack.knows(&task.definition));
    }

    #[test]
    fn bindings_cover_all_consumed_secrets() {
        let handle = |name: &str| Handle {
            resource_type: "secretsmanager_secret".to_string(),
            binding: name.to_string(),
        };
        let secrets = ServiceSecrets {
            admin: handle("admin"),
            jwt: handle("jwt"),
            database_url: handle("db"),
        };

        let bindings = secrets.bindings();
        assert_eq!(bindings.len(), 4);
        let db_bound: Vec<&str> = bindings
            .iter()
            .filter(|(_, s)| s.binding == "db")
            .map(|(v, _)| *v)
            .collect();
        assert_eq!(
            db_bound,
            vec!["PG_DATABASE_URL", "HASURA_GRAPHQL_METADATA_DATABASE_URL"]
        );
    }
}
