//! IAM, EC2 instances and capacity, ECS and CloudWatch Logs

use hasura_infra_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{AwsccSchemaConfig, document, document_list, string_list, tags_type};

/// AWS::IAM::Role
pub fn iam_role_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::IAM::Role",
        resource_type_name: "iam_role",
        has_tags: true,
        outputs: &[("arn", "Arn")],
        schema: ResourceSchema::new("awscc.iam_role")
            .attribute(
                AttributeSchema::new("role_name", AttributeType::String)
                    .with_provider_name("RoleName"),
            )
            .attribute(
                AttributeSchema::new("assume_role_policy_document", document())
                    .required()
                    .with_description("Trust policy. Keys are sent exactly as written.")
                    .with_provider_name("AssumeRolePolicyDocument"),
            )
            .attribute(
                AttributeSchema::new("managed_policy_arns", string_list())
                    .with_provider_name("ManagedPolicyArns"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::IAM::RolePolicy
pub fn iam_role_policy_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::IAM::RolePolicy",
        resource_type_name: "iam_role_policy",
        has_tags: false,
        outputs: &[],
        schema: ResourceSchema::new("awscc.iam_role_policy")
            .with_description("Inline policy attached to one role")
            .attribute(
                AttributeSchema::new("role_name", AttributeType::String)
                    .required()
                    .with_provider_name("RoleName"),
            )
            .attribute(
                AttributeSchema::new("policy_name", AttributeType::String)
                    .required()
                    .with_provider_name("PolicyName"),
            )
            .attribute(
                AttributeSchema::new("policy_document", document())
                    .required()
                    .with_provider_name("PolicyDocument"),
            ),
    }
}

/// AWS::IAM::InstanceProfile
pub fn iam_instance_profile_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::IAM::InstanceProfile",
        resource_type_name: "iam_instance_profile",
        has_tags: false,
        outputs: &[("arn", "Arn")],
        schema: ResourceSchema::new("awscc.iam_instance_profile").attribute(
            AttributeSchema::new("roles", string_list())
                .required()
                .with_provider_name("Roles"),
        ),
    }
}

/// AWS::EC2::Instance
pub fn ec2_instance_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::Instance",
        resource_type_name: "ec2_instance",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ec2_instance")
            .attribute(
                AttributeSchema::new("instance_type", AttributeType::String)
                    .required()
                    .with_provider_name("InstanceType"),
            )
            .attribute(
                AttributeSchema::new("image_id", AttributeType::String)
                    .required()
                    .with_provider_name("ImageId"),
            )
            .attribute(
                AttributeSchema::new("subnet_id", AttributeType::String)
                    .with_provider_name("SubnetId"),
            )
            .attribute(
                AttributeSchema::new("security_group_ids", string_list())
                    .with_provider_name("SecurityGroupIds"),
            )
            .attribute(
                AttributeSchema::new("iam_instance_profile", AttributeType::String)
                    .with_description("Instance profile name.")
                    .with_provider_name("IamInstanceProfile"),
            )
            .attribute(
                AttributeSchema::new("user_data", AttributeType::String)
                    .with_description("Plain-text boot script; base64-encoded when sent.")
                    .with_provider_name("UserData"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::EC2::LaunchTemplate
pub fn ec2_launch_template_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::LaunchTemplate",
        resource_type_name: "ec2_launch_template",
        has_tags: false,
        outputs: &[("latest_version_number", "LatestVersionNumber")],
        schema: ResourceSchema::new("awscc.ec2_launch_template")
            .attribute(
                AttributeSchema::new("launch_template_name", AttributeType::String)
                    .with_provider_name("LaunchTemplateName"),
            )
            .attribute(
                AttributeSchema::new("launch_template_data", document())
                    .required()
                    .with_provider_name("LaunchTemplateData"),
            ),
    }
}

/// AWS::AutoScaling::AutoScalingGroup
pub fn autoscaling_auto_scaling_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::AutoScaling::AutoScalingGroup",
        resource_type_name: "autoscaling_auto_scaling_group",
        has_tags: false,
        outputs: &[],
        schema: ResourceSchema::new("awscc.autoscaling_auto_scaling_group")
            .with_description("Container host capacity for the cluster")
            .attribute(
                AttributeSchema::new("auto_scaling_group_name", AttributeType::String)
                    .with_provider_name("AutoScalingGroupName"),
            )
            .attribute(
                AttributeSchema::new("min_size", AttributeType::Int)
                    .required()
                    .with_provider_name("MinSize"),
            )
            .attribute(
                AttributeSchema::new("desired_capacity", AttributeType::Int)
                    .with_provider_name("DesiredCapacity"),
            )
            .attribute(
                AttributeSchema::new("max_size", types::positive_int())
                    .required()
                    .with_provider_name("MaxSize"),
            )
            .attribute(
                AttributeSchema::new("launch_template", document())
                    .with_provider_name("LaunchTemplate"),
            )
            .attribute(
                AttributeSchema::new("vpc_zone_identifier", string_list())
                    .with_description("Subnets instances are launched into.")
                    .with_provider_name("VPCZoneIdentifier"),
            ),
    }
}

/// AWS::ECS::Cluster
pub fn ecs_cluster_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ECS::Cluster",
        resource_type_name: "ecs_cluster",
        has_tags: true,
        outputs: &[("arn", "Arn")],
        schema: ResourceSchema::new("awscc.ecs_cluster")
            .attribute(
                AttributeSchema::new("cluster_name", AttributeType::String)
                    .with_provider_name("ClusterName"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::ECS::TaskDefinition
pub fn ecs_task_definition_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ECS::TaskDefinition",
        resource_type_name: "ecs_task_definition",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ecs_task_definition")
            .with_description("Task definition for the GraphQL engine container")
            .attribute(
                AttributeSchema::new("family", AttributeType::String).with_provider_name("Family"),
            )
            .attribute(
                AttributeSchema::new("requires_compatibilities", string_list())
                    .with_provider_name("RequiresCompatibilities"),
            )
            .attribute(
                AttributeSchema::new(
                    "network_mode",
                    AttributeType::Enum(vec![
                        "bridge".to_string(),
                        "host".to_string(),
                        "awsvpc".to_string(),
                        "none".to_string(),
                    ]),
                )
                .with_provider_name("NetworkMode"),
            )
            .attribute(
                AttributeSchema::new("execution_role_arn", AttributeType::String)
                    .with_description("Role the agent uses to pull images and read secrets.")
                    .with_provider_name("ExecutionRoleArn"),
            )
            .attribute(
                AttributeSchema::new("container_definitions", document_list())
                    .required()
                    .with_provider_name("ContainerDefinitions"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::ECS::Service
pub fn ecs_service_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ECS::Service",
        resource_type_name: "ecs_service",
        has_tags: true,
        outputs: &[],
        schema: ResourceSchema::new("awscc.ecs_service")
            .attribute(
                AttributeSchema::new("service_name", AttributeType::String)
                    .with_provider_name("ServiceName"),
            )
            .attribute(
                AttributeSchema::new("cluster", AttributeType::String)
                    .required()
                    .with_provider_name("Cluster"),
            )
            .attribute(
                AttributeSchema::new("task_definition", AttributeType::String)
                    .required()
                    .with_provider_name("TaskDefinition"),
            )
            .attribute(
                AttributeSchema::new("desired_count", AttributeType::Int)
                    .with_provider_name("DesiredCount"),
            )
            .attribute(
                AttributeSchema::new(
                    "launch_type",
                    AttributeType::Enum(vec![
                        "EC2".to_string(),
                        "FARGATE".to_string(),
                        "EXTERNAL".to_string(),
                    ]),
                )
                .with_provider_name("LaunchType"),
            )
            .attribute(
                AttributeSchema::new("load_balancers", document_list())
                    .with_provider_name("LoadBalancers"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

/// AWS::Logs::LogGroup
pub fn logs_log_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::Logs::LogGroup",
        resource_type_name: "logs_log_group",
        has_tags: true,
        outputs: &[("arn", "Arn")],
        schema: ResourceSchema::new("awscc.logs_log_group")
            .attribute(
                AttributeSchema::new("log_group_name", AttributeType::String)
                    .with_provider_name("LogGroupName"),
            )
            .attribute(AttributeSchema::new("tags", tags_type()).with_provider_name("Tags")),
    }
}

pub fn configs() -> Vec<AwsccSchemaConfig> {
    vec![
        iam_role_config(),
        iam_role_policy_config(),
        iam_instance_profile_config(),
        ec2_instance_config(),
        ec2_launch_template_config(),
        autoscaling_auto_scaling_group_config(),
        ecs_cluster_config(),
        ecs_task_definition_config(),
        ecs_service_config(),
        logs_log_group_config(),
    ]
}
