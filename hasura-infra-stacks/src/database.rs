//! PostgreSQL instance and its connection-pooling proxy

use hasura_infra_core::naming;
use hasura_infra_core::resource::{RemovalPolicy, Resource, Value};

use crate::network::TrustBoundary;
use crate::stack::{Handle, Stack, assume_role_policy, policy_document};

pub const ENGINE: &str = "postgres";
pub const ENGINE_VERSION: &str = "12";
pub const INSTANCE_CLASS: &str = "db.t3.micro";
pub const ALLOCATED_STORAGE_GIB: i64 = 100;

#[derive(Debug, Clone)]
pub struct Database {
    pub subnet_group: Handle,
    pub instance: Handle,
    pub proxy: Handle,
}

/// Declare the database instance, subnet group and proxy
///
/// The instance is always retained: destroying the deployment leaves the data
/// in place.
pub fn declare_database(
    stack: &mut Stack<'_>,
    private_subnets: &[Handle],
    boundary: &TrustBoundary,
    primary_secret: &Handle,
) -> Database {
    let config = stack.config();
    let env = config.environment.as_str();
    let private_ids = Value::List(private_subnets.iter().map(Handle::id).collect());
    let boundary_ids = Value::List(vec![boundary.handle().id()]);

    let subnet_group = stack.declare(
        Resource::new("rds_db_subnet_group", config.name("db-subnet-group"))
            .with_attribute(
                "db_subnet_group_name",
                Value::string(config.name("db-subnet-group").to_lowercase()),
            )
            .with_attribute(
                "db_subnet_group_description",
                Value::string("Private subnets for the database"),
            )
            .with_attribute("subnet_ids", private_ids.clone()),
    );

    let identifier = naming::instance_identifier(env, &config.project);
    let instance = stack.declare(
        Resource::new("rds_db_instance", identifier.as_str())
            .with_attribute("db_instance_identifier", Value::string(identifier.as_str()))
            .with_attribute(
                "db_name",
                Value::string(naming::database_name(env, &config.project)),
            )
            .with_attribute("engine", Value::string(ENGINE))
            .with_attribute("engine_version", Value::string(ENGINE_VERSION))
            .with_attribute("db_instance_class", Value::string(INSTANCE_CLASS))
            .with_attribute("allocated_storage", Value::Int(ALLOCATED_STORAGE_GIB))
            .with_attribute("auto_minor_version_upgrade", Value::Bool(false))
            .with_attribute("publicly_accessible", Value::Bool(false))
            .with_attribute("db_subnet_group_name", subnet_group.id())
            .with_attribute("vpc_security_groups", boundary_ids.clone())
            .with_attribute("master_user_secret_arn", primary_secret.id())
            .with_removal_policy(RemovalPolicy::Retain),
    );

    let proxy_role = stack.declare(
        Resource::new("iam_role", config.name("proxy-role"))
            .with_attribute("role_name", Value::string(config.name("proxy-role")))
            .with_attribute(
                "assume_role_policy_document",
                assume_role_policy("rds.amazonaws.com"),
            ),
    );
    stack.declare(
        Resource::new("iam_role_policy", config.name("proxy-secret-read"))
            .with_attribute("role_name", proxy_role.id())
            .with_attribute("policy_name", Value::string(config.name("proxy-secret-read")))
            .with_attribute(
                "policy_document",
                policy_document(
                    &["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
                    vec![primary_secret.id()],
                ),
            ),
    );

    let proxy_name = config.name("proxy");
    let proxy = stack.declare(
        Resource::new("rds_db_proxy", proxy_name.as_str())
            .with_attribute("db_proxy_name", Value::string(proxy_name.as_str()))
            .with_attribute("engine_family", Value::string("POSTGRESQL"))
            .with_attribute(
                "auth",
                Value::List(vec![Value::map([
                    ("auth_scheme", Value::string("SECRETS")),
                    ("secret_arn", primary_secret.id()),
                    ("iam_auth", Value::string("DISABLED")),
                ])]),
            )
            .with_attribute("role_arn", proxy_role.arn())
            .with_attribute("vpc_subnet_ids", private_ids)
            .with_attribute("vpc_security_group_ids", boundary_ids)
            .with_attribute("debug_logging", Value::Bool(true))
            .with_attribute("require_tls", Value::Bool(true)),
    );
    stack.declare(
        Resource::new("rds_db_proxy_target_group", config.name("proxy-target-group"))
            .with_attribute("db_proxy_name", proxy.id())
            .with_attribute("target_group_name", Value::string("default"))
            .with_attribute("db_instance_identifiers", Value::List(vec![instance.id()])),
    );

    Database {
        subnet_group,
        instance,
        proxy,
    }
}
