use hasura_infra_core::resource::{Resource, Value};

use crate::network::TrustBoundary;
use crate::stack::{Handle, Stack, assume_role_policy, policy_document};

pub const BASTION_INSTANCE_TYPE: &str = "t2.micro";
pub const AMAZON_LINUX_2_AMI: &str =
    "{{resolve:ssm:/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2}}";
const SSM_CORE_POLICY: &str = "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore";

/// Startup script installing the PostgreSQL client
pub fn user_data() -> String {
    ["#!/bin/bash", "yum -y update", "yum install -y postgresql jq"].join("\n")
}

#[derive(Debug, Clone)]
pub struct Bastion {
    pub instance: Handle,
    pub role: Handle,
}

/// Declare the bastion host in the first public subnet
///
/// The host is reached through session manager only; its boundary has no
/// ingress rules. It may read the primary credential secret and nothing else.
pub fn declare_bastion(
    stack: &mut Stack<'_>,
    public_subnet: &Handle,
    boundary: &TrustBoundary,
    primary_secret: &Handle,
) -> Bastion {
    let config = stack.config();

    let role = stack.declare(
        Resource::new("iam_role", config.name("bastion-role"))
            .with_attribute("role_name", Value::string(config.name("bastion-role")))
            .with_attribute(
                "assume_role_policy_document",
                assume_role_policy("ec2.amazonaws.com"),
            )
            .with_attribute("managed_policy_arns", Value::strings([SSM_CORE_POLICY])),
    );
    stack.declare(
        Resource::new("iam_role_policy", config.name("bastion-secret-read"))
            .with_attribute("role_name", role.id())
            .with_attribute("policy_name", Value::string(config.name("bastion-secret-read")))
            .with_attribute(
                "policy_document",
                policy_document(
                    &["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
                    vec![primary_secret.id()],
                ),
            ),
    );
    let profile = stack.declare(
        Resource::new("iam_instance_profile", config.name("bastion-profile"))
            .with_attribute("roles", Value::List(vec![role.id()])),
    );

    let instance_name = config.name("bastion-host");
    let instance = stack.declare(
        Resource::new("ec2_instance", instance_name.as_str())
            .with_attribute("instance_type", Value::string(BASTION_INSTANCE_TYPE))
            .with_attribute("image_id", Value::string(AMAZON_LINUX_2_AMI))
            .with_attribute("subnet_id", public_subnet.id())
            .with_attribute(
                "security_group_ids",
                Value::List(vec![boundary.handle().id()]),
            )
            .with_attribute("iam_instance_profile", profile.id())
            .with_attribute("user_data", Value::string(user_data()))
            .with_attribute("tags", Value::map([("Name", Value::string(instance_name))])),
    );

    Bastion { instance, role }
}
